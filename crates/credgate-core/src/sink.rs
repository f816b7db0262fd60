use tracing::warn;

use crate::error::ProviderError;

/// Receives every provider failure the gateway observes, including the ones
/// it turns into a negative verification result.
pub trait ErrorSink: Send + Sync {
    fn provider_failure(&self, operation: &'static str, error: &ProviderError);
}

/// Reports failures as `tracing` warnings.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn provider_failure(&self, operation: &'static str, error: &ProviderError) {
        warn!(
            operation,
            call = %error.call,
            code = %format!("0x{:08x}", error.code),
            "provider call failed"
        );
    }
}

/// Drops failure reports.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSink;

impl ErrorSink for SilentSink {
    fn provider_failure(&self, _operation: &'static str, _error: &ProviderError) {}
}
