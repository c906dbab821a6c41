//! HTTP middleware.
//!
//! Layer order, outermost first (set up in `routes::app` and `main`):
//! 1. Sentry (`NewSentryLayer`, `SentryHttpLayer`)
//! 2. CORS
//! 3. `TraceLayer` (one `http_request` span per request)
//! 4. Request id

pub mod request_id;
