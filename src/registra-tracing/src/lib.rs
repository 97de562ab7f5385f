use anyhow::Result;
use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{Protocol, WithExportConfig};
use opentelemetry_sdk::{Resource, trace as sdktrace};
use opentelemetry_stdout::SpanExporter;
use std::borrow::Cow;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::{Registry, prelude::*};

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

/// Split a logging mode into format and filter directive.
///
/// `json`, `pretty` and `compact` pick the format and leave the filter to
/// `RUST_LOG` (default `info`); anything else is used as the filter itself.
pub fn parse_mode(logging_mode: &str) -> (LogFormat, Option<&str>) {
    match logging_mode.trim() {
        "json" => (LogFormat::Json, None),
        "pretty" => (LogFormat::Pretty, None),
        "compact" | "" => (LogFormat::Compact, None),
        directive => (LogFormat::Compact, Some(directive)),
    }
}

fn env_filter(directive: Option<&str>) -> EnvFilter {
    match directive {
        Some(d) => EnvFilter::try_new(d).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

/// Handle on the tracer provider; flush it before the process exits.
pub struct Telemetry {
    provider: sdktrace::SdkTracerProvider,
}

impl Telemetry {
    pub fn shutdown(self) {
        if let Err(e) = self.provider.shutdown() {
            eprintln!("tracer provider shutdown failed: {e}");
        }
    }
}

/// Initialize tracing + OpenTelemetry tracer provider.
pub fn init(service_name: &str, otlp_endpoint: Option<&str>, logging_mode: &str) -> Result<Telemetry> {
    let resource = Resource::builder()
        .with_service_name(Cow::Owned(service_name.to_string()))
        .with_attributes(vec![KeyValue::new("service.version", env!("CARGO_PKG_VERSION"))])
        .build();

    let provider = if let Some(endpoint) = otlp_endpoint {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_protocol(Protocol::HttpBinary)
            .with_endpoint(endpoint)
            .build()?;

        sdktrace::SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(resource)
            .build()
    } else {
        sdktrace::SdkTracerProvider::builder()
            .with_simple_exporter(SpanExporter::default())
            .with_resource(resource)
            .build()
    };

    let tracer = provider.tracer(Cow::Owned(service_name.to_string()));
    let otel_layer = OpenTelemetryLayer::new(tracer);

    let (format, directive) = parse_mode(logging_mode);
    let filter = env_filter(directive);

    // boxed so the three formats unify
    let fmt_layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = match format {
        LogFormat::Json => Box::new(
            fmt::layer()
                .json()
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_filter(filter),
        ),
        LogFormat::Pretty => Box::new(fmt::layer().pretty().with_filter(filter)),
        LogFormat::Compact => Box::new(fmt::layer().compact().with_filter(filter)),
    };

    let subscriber = Registry::default().with(fmt_layer).with(otel_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(Telemetry { provider })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_leave_filter_to_environment() {
        assert_eq!(parse_mode("json"), (LogFormat::Json, None));
        assert_eq!(parse_mode("pretty"), (LogFormat::Pretty, None));
        assert_eq!(parse_mode(""), (LogFormat::Compact, None));
    }

    #[test]
    fn other_modes_are_filter_directives() {
        assert_eq!(parse_mode("debug"), (LogFormat::Compact, Some("debug")));
        assert_eq!(
            parse_mode("registra_core=trace,info"),
            (LogFormat::Compact, Some("registra_core=trace,info"))
        );
    }
}
