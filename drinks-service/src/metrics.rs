use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use common_http_errors::ERROR_CODE_HEADER;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

pub const SERVICE_NAME: &str = "drinks-service";

/// Service registry; on Linux it also exports the `process_*` families for this process.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    #[cfg(target_os = "linux")]
    registry
        .register(Box::new(prometheus::process_collector::ProcessCollector::for_self()))
        .ok();
    registry
});

pub static HTTP_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let v = IntCounterVec::new(
        Opts::new("http_errors_total", "Count of HTTP error responses emitted (status >= 400)"),
        &["service", "code", "status"],
    )
    .expect("http_errors_total opts are valid");
    REGISTRY.register(Box::new(v.clone())).ok();
    v
});

pub static DRINK_WRITES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let v = IntCounterVec::new(
        Opts::new("drinks_writes_total", "Drink writes by operation and outcome"),
        &["op", "outcome"],
    )
    .expect("drinks_writes_total opts are valid");
    REGISTRY.register(Box::new(v.clone())).ok();
    v
});

pub fn record_write(op: &str, ok: bool) {
    DRINK_WRITES_TOTAL
        .with_label_values(&[op, if ok { "ok" } else { "failed" }])
        .inc();
}

/// Counts every error response by the machine code the handler attached.
pub async fn http_error_metrics(req: Request, next: Next) -> Response {
    let resp = next.run(req).await;
    let status = resp.status();
    if status.as_u16() >= 400 {
        let code = resp
            .headers()
            .get(ERROR_CODE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown");
        HTTP_ERRORS_TOTAL
            .with_label_values(&[SERVICE_NAME, code, status.as_str()])
            .inc();
    }
    resp
}

/// Prometheus text exposition of the service registry.
pub fn gather() -> Result<String, prometheus::Error> {
    let mut buf = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

pub async fn metrics_endpoint() -> (StatusCode, String) {
    match gather() {
        Ok(text) => (StatusCode::OK, text),
        Err(err) => {
            tracing::error!(error = %err, "metrics encode failed");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_counter_is_exported() {
        record_write("create", true);
        record_write("create", false);
        let text = gather().unwrap();
        assert!(text.contains("drinks_writes_total{op=\"create\",outcome=\"ok\"}"));
        assert!(text.contains("drinks_writes_total{op=\"create\",outcome=\"failed\"}"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn process_metrics_are_exported() {
        let text = gather().unwrap();
        assert!(text.contains("process_cpu_seconds_total"));
        assert!(text.contains("process_resident_memory_bytes"));
    }
}
