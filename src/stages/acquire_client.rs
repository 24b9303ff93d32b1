//! Acquire-client stage: resolve the configured provider before any
//! network work starts.
//!
//! This is the pipeline's configuration gate. Missing or incomplete
//! provider settings surface here — before the fan-out stages spend any
//! bandwidth — as a fatal [`HoistError::ClientNotConfigured`] that aborts
//! the whole chain.

use crate::context::ProcessingContext;
use crate::error::HoistError;
use crate::stage::{Stage, StageControl};
use async_trait::async_trait;

pub struct AcquireClientStage;

#[async_trait]
impl Stage for AcquireClientStage {
    fn name(&self) -> &str {
        "Select storage client"
    }

    async fn execute(&self, ctx: &mut ProcessingContext) -> Result<StageControl, HoistError> {
        let kind = ctx.config.cloud;
        match ctx.registry.client(kind) {
            Ok(client) => {
                tracing::debug!("using storage client '{}'", kind);
                ctx.client = Some(client);
                Ok(StageControl::Continue)
            }
            Err(e) => {
                tracing::error!("{e}");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::CloudKind;
    use crate::config::{HoistConfig, SmmsSettings};

    #[tokio::test]
    async fn missing_settings_abort_fatally() {
        let config = HoistConfig::builder().cloud(CloudKind::Aliyun).build().unwrap();
        let mut ctx = ProcessingContext::new(config);
        let err = AcquireClientStage.execute(&mut ctx).await.unwrap_err();
        assert!(matches!(err, HoistError::ClientNotConfigured { .. }));
        assert!(ctx.client.is_none());
    }

    #[tokio::test]
    async fn configured_provider_is_resolved_into_the_context() {
        let config = HoistConfig::builder()
            .cloud(CloudKind::Smms)
            .smms(SmmsSettings {
                token: "tok".into(),
                ..SmmsSettings::default()
            })
            .build()
            .unwrap();
        let mut ctx = ProcessingContext::new(config);
        let control = AcquireClientStage.execute(&mut ctx).await.unwrap();
        assert_eq!(control, StageControl::Continue);
        assert_eq!(ctx.client.as_ref().unwrap().cloud_kind(), CloudKind::Smms);
    }
}
