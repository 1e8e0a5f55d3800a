//! jq 방언 쿼리 기반 포함 판정
//!
//! 구성 시점에 쿼리를 파싱/컴파일하고, 라인마다 최상위 JSON 객체에 대해
//! 실행합니다. 첫 번째 결과만 사용합니다:
//! - 결과 없음 → 제외 (`select`가 라인을 걸러낸 경우)
//! - 첫 결과가 에러 값 → 전파 (호출자 fail-open)
//! - 첫 결과가 `false`/`null` → 제외
//! - 그 외 → 포함

use jaq_interpret::{Ctx, Filter, FilterT, ParseCtx, RcIter, Val};

use super::LineFilter;
use crate::error::FilterError;

/// jq 방언 쿼리 필터
///
/// 예: `select(.k1 != "v1") | select(.k2 != "v2")`
pub struct QueryFilter {
    filter: Filter,
}

impl QueryFilter {
    /// 쿼리를 파싱하고 컴파일합니다. 잘못된 쿼리는 셋업 에러입니다.
    pub fn new(query: &str) -> Result<Self, FilterError> {
        let mut defs = ParseCtx::new(Vec::new());
        defs.insert_natives(jaq_core::core());
        defs.insert_defs(jaq_std::std());

        let (main, parse_errors) = jaq_parse::parse(query, jaq_parse::main());
        if !parse_errors.is_empty() {
            let reasons: Vec<String> = parse_errors.iter().map(|e| format!("{e:?}")).collect();
            return Err(FilterError::QueryParse(reasons.join("; ")));
        }
        let Some(main) = main else {
            return Err(FilterError::QueryParse("empty query".to_owned()));
        };

        let filter = defs.compile(main);
        if !defs.errs.is_empty() {
            let reasons: Vec<String> = defs.errs.iter().map(|(err, _)| format!("{err}")).collect();
            return Err(FilterError::QueryCompile(reasons.join("; ")));
        }

        Ok(Self { filter })
    }
}

impl LineFilter for QueryFilter {
    fn is_included(&mut self, line: &[u8]) -> Result<bool, FilterError> {
        let value: serde_json::Value = serde_json::from_slice(line)?;
        if !value.is_object() {
            return Err(FilterError::NotAnObject);
        }

        let inputs = RcIter::new(core::iter::empty());
        let mut outputs = self.filter.run((Ctx::new([], &inputs), Val::from(value)));

        match outputs.next() {
            None => Ok(false),
            Some(Err(e)) => Err(FilterError::QueryEval(e.to_string())),
            Some(Ok(Val::Bool(false))) | Some(Ok(Val::Null)) => Ok(false),
            Some(Ok(_)) => Ok(true),
        }
    }
}
