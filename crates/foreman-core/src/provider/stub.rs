//! A deterministic provider used in tests and as the `gemini_stub` fallback
//! at the end of the default priority list.

use async_trait::async_trait;

use super::{Provider, ProviderRequest, ProviderResult};

/// Returns a fixed or closure-computed result; never touches the network
/// or a subprocess.
pub struct StubProvider {
    name: String,
    responder: Box<dyn Fn(&ProviderRequest) -> ProviderResult + Send + Sync>,
}

impl StubProvider {
    pub fn new(name: impl Into<String>, responder: impl Fn(&ProviderRequest) -> ProviderResult + Send + Sync + 'static) -> Self {
        StubProvider { name: name.into(), responder: Box::new(responder) }
    }

    /// A stub that always reports success with the given stdout text.
    pub fn always_ok(name: impl Into<String>, stdout: impl Into<String>) -> Self {
        let stdout = stdout.into();
        StubProvider::new(name, move |_req| ProviderResult { stdout: stdout.clone(), raw_output: stdout.clone(), exit_code: Some(0), ..Default::default() })
    }
}

#[async_trait]
impl Provider for StubProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, request: &ProviderRequest) -> anyhow::Result<ProviderResult> {
        Ok((self.responder)(request))
    }
}
