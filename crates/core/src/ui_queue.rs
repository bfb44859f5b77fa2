//! UI-thread task queue
//!
//! Every widget mutation goes through here. Background workers hand a task to
//! the [`UiDispatcher`] and wait for its result; the [`UiLoop`], driven by the
//! toolkit's main context on the UI thread, runs tasks one at a time.
//!
//! ```text
//! worker ── invoke(task) ──► mpsc ──► UiLoop (UI thread) ── task(&mut ctx)
//!    ▲                                                           │
//!    └──────────────────────── oneshot result ◄──────────────────┘
//! ```

use crate::error::UiError;
use log::{debug, trace, warn};
use rg_bar_types::WidgetHandle;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::sync::{mpsc, oneshot};

/// Bridge from toolkit-neutral widget handles to real toolkit widgets
///
/// Lives on the UI thread only, so implementations may hold non-`Send`
/// toolkit objects.
pub trait WidgetRenderer {
    /// A module created a new widget
    fn realize(&mut self, widget: &WidgetHandle);

    /// A module mutated its widget state
    fn render(&mut self, widget: &WidgetHandle);

    /// The widget is no longer used
    fn release(&mut self, widget: &WidgetHandle);
}

/// State owned by the UI loop and lent to every task
#[derive(Default)]
pub struct UiContext {
    renderer: Option<Box<dyn WidgetRenderer>>,
    tasks_run: u64,
}

impl UiContext {
    pub fn realize(&mut self, widget: &WidgetHandle) {
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.realize(widget);
        }
    }

    pub fn render(&mut self, widget: &WidgetHandle) {
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.render(widget);
        }
    }

    pub fn release(&mut self, widget: &WidgetHandle) {
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.release(widget);
        }
    }

    /// Number of tasks executed so far
    pub fn tasks_run(&self) -> u64 {
        self.tasks_run
    }
}

/// A unit of work executed on the UI thread
pub type UiTask = Box<dyn FnOnce(&mut UiContext) + Send>;

/// Any-thread handle used to submit work to the UI thread
#[derive(Clone)]
pub struct UiDispatcher {
    tx: mpsc::UnboundedSender<UiTask>,
}

/// UI-thread side of the queue
pub struct UiLoop {
    rx: mpsc::UnboundedReceiver<UiTask>,
    ctx: UiContext,
}

/// Create a connected dispatcher/loop pair
pub fn ui_channel() -> (UiDispatcher, UiLoop) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        UiDispatcher { tx },
        UiLoop {
            rx,
            ctx: UiContext::default(),
        },
    )
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl UiDispatcher {
    fn submit<R, F>(&self, f: F) -> Result<oneshot::Receiver<Result<R, UiError>>, UiError>
    where
        R: Send + 'static,
        F: FnOnce(&mut UiContext) -> R + Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let task: UiTask = Box::new(move |ctx| {
            let result = catch_unwind(AssertUnwindSafe(|| f(ctx)))
                .map_err(|payload| UiError::Panicked(panic_message(payload)));
            if result_tx.send(result).is_err() {
                trace!("UI task result dropped, caller went away");
            }
        });
        self.tx.send(task).map_err(|_| UiError::Closed)?;
        Ok(result_rx)
    }

    /// Run `f` on the UI thread and wait for its result
    pub async fn invoke<R, F>(&self, f: F) -> Result<R, UiError>
    where
        R: Send + 'static,
        F: FnOnce(&mut UiContext) -> R + Send + 'static,
    {
        let rx = self.submit(f)?;
        rx.await.map_err(|_| UiError::Closed)?
    }

    /// Run `f` on the UI thread, blocking the current thread until done
    ///
    /// For plain threads only. Calling this from the UI thread deadlocks, and
    /// calling it from inside an async task panics.
    pub fn invoke_blocking<R, F>(&self, f: F) -> Result<R, UiError>
    where
        R: Send + 'static,
        F: FnOnce(&mut UiContext) -> R + Send + 'static,
    {
        let rx = self.submit(f)?;
        rx.blocking_recv().map_err(|_| UiError::Closed)?
    }

    /// Queue `f` without waiting for it
    pub fn post<F>(&self, f: F) -> Result<(), UiError>
    where
        F: FnOnce(&mut UiContext) + Send + 'static,
    {
        self.submit(f).map(|_| ())
    }

    /// Whether the UI loop still accepts tasks
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

impl UiLoop {
    /// Attach the toolkit renderer
    pub fn with_renderer(mut self, renderer: Box<dyn WidgetRenderer>) -> Self {
        self.ctx.renderer = Some(renderer);
        self
    }

    fn run_task(&mut self, task: UiTask) {
        task(&mut self.ctx);
        self.ctx.tasks_run += 1;
    }

    /// Run every task queued so far without waiting for more
    ///
    /// Returns the number of tasks executed.
    pub fn run_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok(task) = self.rx.try_recv() {
            self.run_task(task);
            count += 1;
        }
        count
    }

    /// Drain tasks until every dispatcher is dropped
    ///
    /// Meant to be spawned on the UI thread's executor.
    pub async fn run(mut self) {
        debug!("UI loop started");
        while let Some(task) = self.rx.recv().await {
            self.run_task(task);
        }
        warn!(
            "UI loop stopped after {} tasks, all dispatchers dropped",
            self.ctx.tasks_run
        );
    }

    pub fn context(&self) -> &UiContext {
        &self.ctx
    }
}
