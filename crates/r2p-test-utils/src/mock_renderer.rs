//! Summary renderer mock.

use async_trait::async_trait;
use r2p_service::announcement::Summary;
use r2p_service::errors::R2pError;
use r2p_service::services::SummaryRenderer;
use std::sync::{Arc, Mutex};

/// Bytes returned by a successful render.
pub const MOCK_IMAGE: &[u8] = b"\x89PNG-mock";

/// Mock renderer recording every summary it was asked to render.
#[derive(Debug, Clone, Default)]
pub struct MockRenderer {
    inner: Arc<Mutex<MockRendererInner>>,
}

#[derive(Debug, Default)]
struct MockRendererInner {
    rendered: Vec<Summary>,
    fail: bool,
}

impl MockRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every render fails.
    #[must_use]
    pub fn failing() -> Self {
        let renderer = Self::default();
        renderer.inner.lock().unwrap().fail = true;
        renderer
    }

    pub fn rendered(&self) -> Vec<Summary> {
        self.inner.lock().unwrap().rendered.clone()
    }
}

#[async_trait]
impl SummaryRenderer for MockRenderer {
    async fn render(&self, summary: &Summary) -> Result<Vec<u8>, R2pError> {
        let mut inner = self.inner.lock().unwrap();
        inner.rendered.push(summary.clone());
        if inner.fail {
            return Err(R2pError::Render("mock render failure".to_string()));
        }
        Ok(MOCK_IMAGE.to_vec())
    }
}
