//! Synthetic responses used when a navigation cannot be served normally.

use edge_core::Response;
use http::StatusCode;

/// Page answering a navigation whose upstream demanded authentication.
///
/// Browsers do not show the basic-auth prompt for a response produced by an
/// intercepting worker, so the page unregisters the worker and reloads; the
/// reload reaches the server directly and gets the native prompt.
pub const AUTH_RECOVERY_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Authentication required</title></head>
<body>
<script>
(function () {
  var reload = function () { window.location.reload(); };
  if (navigator.serviceWorker) {
    navigator.serviceWorker.getRegistrations()
      .then(function (regs) { return Promise.all(regs.map(function (r) { return r.unregister(); })); })
      .then(reload, reload);
  } else {
    reload();
  }
})();
</script>
</body>
</html>
"#;

/// Page served when the network is down and no offline page is cached.
pub const OFFLINE_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Offline</title></head>
<body><h1>You are offline</h1><p>Check your connection and try again.</p></body>
</html>
"#;

/// Response for a `401` navigation.
pub fn auth_recovery_page() -> Response {
    Response::html(StatusCode::OK, AUTH_RECOVERY_HTML).with_header("cache-control", "no-store")
}

/// Response for a failed navigation when the cached offline page is missing.
pub fn offline_unavailable_page() -> Response {
    Response::html(StatusCode::SERVICE_UNAVAILABLE, OFFLINE_HTML)
        .with_header("cache-control", "no-store")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_auth_page_unregisters_and_reloads() {
        let response = auth_recovery_page();
        assert_eq!(response.status, StatusCode::OK);
        let body = response.body.collect().await.unwrap();
        let html = std::str::from_utf8(&body).unwrap();
        assert!(html.contains("unregister()"));
        assert!(html.contains("location.reload()"));
    }

    #[test]
    fn test_offline_page_status() {
        let response = offline_unavailable_page();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.header("cache-control"), Some("no-store"));
    }
}
