use std::sync::Arc;

use paperlens_core::{
    ChatBackend, Config, HttpTransport, ModelError, OpenAiCompatible, PdfBackend,
    ReqwestTransport,
};
use paperlens_pdf_mupdf::MupdfBackend;

/// Builds the model backend for one request from its resolved config.
pub type ChatFactory =
    Arc<dyn Fn(&Config) -> Result<Arc<dyn ChatBackend>, ModelError> + Send + Sync>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    /// Server-wide defaults; requests overlay their own fields on a copy.
    pub config: Config,
    pub transport: Arc<dyn HttpTransport>,
    pub pdf: Arc<dyn PdfBackend>,
    pub chat: ChatFactory,
}

impl AppState {
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self {
            config,
            transport: Arc::new(transport),
            pdf: Arc::new(MupdfBackend::new()),
            chat: Arc::new(|config: &Config| {
                let backend = OpenAiCompatible::from_config(config)?;
                Ok(Arc::new(backend) as Arc<dyn ChatBackend>)
            }),
        })
    }
}
