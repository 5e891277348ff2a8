#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("No valid telemetry data found for any driver")]
    NoDrivers,
    #[error("corrupt telemetry for driver {driver}: {reason}")]
    CorruptTelemetry { driver: String, reason: String },
    #[error(transparent)]
    Adapter(#[from] telemetry_adapter::AdapterError),
}
