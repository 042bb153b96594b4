use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Data, Request, Response};
use std::time::Instant;

/// Fairing to log one line per HTTP request with timing.
pub struct RequestLogger;

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        request.local_cache(Instant::now);
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let start_time = request.local_cache(Instant::now);
        let duration = start_time.elapsed();

        // Query strings can carry credentials; log the path only.
        let method = request.method();
        let path = request.uri().path();
        let status = response.status();
        let elapsed_ms = duration.as_secs_f64() * 1000.0;

        if matches!(status.code, 401 | 403) {
            log::warn!("{} {} -> {} ({:.2}ms)", method, path, status.code, elapsed_ms);
        } else {
            log::info!("{} {} -> {} ({:.2}ms)", method, path, status.code, elapsed_ms);
        }
    }
}
