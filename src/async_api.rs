use crate::handler::ScreenshotHandler;
use crate::http::{HttpRequest, HttpResponse};
use crate::{Error, Launcher};
use log::error;
use std::sync::Arc;
use std::time::Duration;

/// Async front of a [`ScreenshotHandler`].
///
/// Each request runs on tokio's blocking pool, since a render blocks on the
/// browser for seconds. The whole request is bounded by an execution budget;
/// when it runs out the client gets a timeout error while the render keeps
/// going in the background until its browser session has been released.
pub struct ScreenshotService<L> {
    handler: Arc<ScreenshotHandler<L>>,
    budget: Duration,
}

impl<L> Clone for ScreenshotService<L> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            budget: self.budget,
        }
    }
}

impl<L: Launcher + 'static> ScreenshotService<L> {
    pub fn new(handler: ScreenshotHandler<L>, budget: Duration) -> Self {
        Self {
            handler: Arc::new(handler),
            budget,
        }
    }

    pub fn handler(&self) -> &ScreenshotHandler<L> {
        &self.handler
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Handle one request within the execution budget.
    pub async fn handle(&self, req: HttpRequest) -> HttpResponse {
        let handler = self.handler.clone();
        let method = req.method.clone();
        let path = req.path.clone();
        let task = tokio::task::spawn_blocking(move || handler.handle(&req));

        match tokio::time::timeout(self.budget, task).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(join_err)) => {
                error!("Render task for {} {} failed: {}", method, path, join_err);
                HttpResponse::from_error(&Error::Other(format!("Render task failed: {}", join_err)))
            }
            Err(_) => {
                let err = Error::Timeout(self.budget.as_millis() as u64);
                error!("{} {} exceeded the execution budget: {}", method, path, err);
                HttpResponse::from_error(&err)
            }
        }
    }
}
