//! 표현식 템플릿 기반 제외 판정
//!
//! 구성 시점에 템플릿을 컴파일하고, 라인마다 파싱된 JSON 값을 컨텍스트로
//! 렌더링합니다. 렌더링 결과 어딘가에 리터럴 `true`가 있으면 라인을
//! 제외합니다.

use minijinja::Environment;

use super::LineFilter;
use crate::error::FilterError;

const TEMPLATE_NAME: &str = "exclude";

/// 표현식 템플릿 필터
///
/// 렌더링 결과에 대한 검사는 불리언 파싱이 아니라 의도적으로 거친
/// 부분 문자열 검사입니다. 독립적인 불리언 절 여러 개를 가진 템플릿이
/// 각각 `true`를 렌더링해 제외에 투표할 수 있게 하기 위함입니다.
pub struct TemplateFilter {
    env: Environment<'static>,
    /// 라인별 렌더링에 재사용하는 스크래치 버퍼. 사용 전마다 비웁니다.
    /// 동시 재사용은 안전하지 않습니다 — 팬인 태스크 단독 사용 전제.
    buf: Vec<u8>,
}

impl TemplateFilter {
    /// 템플릿을 컴파일합니다. 잘못된 템플릿은 셋업 에러입니다.
    pub fn new(template_source: &str) -> Result<Self, FilterError> {
        let mut env = Environment::new();
        env.add_template_owned(TEMPLATE_NAME.to_owned(), template_source.to_owned())
            .map_err(|e| FilterError::TemplateParse(e.to_string()))?;

        Ok(Self {
            env,
            buf: Vec::new(),
        })
    }
}

impl LineFilter for TemplateFilter {
    fn is_included(&mut self, line: &[u8]) -> Result<bool, FilterError> {
        let value: serde_json::Value = serde_json::from_slice(line)?;

        self.buf.clear();
        let template = self
            .env
            .get_template(TEMPLATE_NAME)
            .map_err(|e| FilterError::TemplateRender(e.to_string()))?;
        let _ = template
            .render_to_write(&value, &mut self.buf)
            .map_err(|e| FilterError::TemplateRender(e.to_string()))?;

        let exclude = contains_true(&self.buf);
        Ok(!exclude)
    }
}

fn contains_true(rendered: &[u8]) -> bool {
    rendered.windows(4).any(|window| window == b"true")
}
