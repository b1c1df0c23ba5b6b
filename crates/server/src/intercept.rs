use std::cell::Cell;

use crate::backend::{Backend, CallRecord};
use crate::server::{CommandServer, Flow, Termination};

thread_local! {
    /// Set while this thread is inside [`Interceptor::intercept`]
    static INSIDE_INTERCEPTOR: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as inside the interceptor until dropped
struct ReentrancyGuard;

impl ReentrancyGuard {
    fn enter() -> Option<Self> {
        INSIDE_INTERCEPTOR.with(|inside| {
            if inside.get() {
                None
            } else {
                inside.set(true);
                Some(ReentrancyGuard)
            }
        })
    }
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        INSIDE_INTERCEPTOR.with(|inside| inside.set(false));
    }
}

/// Whether the current thread is already inside the interception wrapper
pub fn is_inside_interceptor() -> bool {
    INSIDE_INTERCEPTOR.with(Cell::get)
}

type TerminationHandler = Box<dyn Fn(Termination) + Send + Sync>;

/// Wraps every intercepted call with the command server's hooks
///
/// The server sees the call just before it is dispatched and again once its
/// errors are known. Calls made while a hook is running (the backend reading
/// state, for instance) go straight to the real implementation.
pub struct Interceptor<B> {
    server: CommandServer<B>,
    on_terminate: TerminationHandler,
}

impl<B: Backend> Interceptor<B> {
    pub fn new(server: CommandServer<B>) -> Self {
        Self {
            server,
            on_terminate: Box::new(|termination: Termination| {
                termination.exit();
            }),
        }
    }

    /// Replace the default handler, which exits the process
    pub fn with_termination_handler(
        mut self,
        handler: impl Fn(Termination) + Send + Sync + 'static,
    ) -> Self {
        self.on_terminate = Box::new(handler);
        self
    }

    pub fn server(&self) -> &CommandServer<B> {
        &self.server
    }

    /// Service the client before the program makes its first call
    pub fn start(&self) {
        let _guard = ReentrancyGuard::enter();
        let flow = self.server.start();
        self.check(flow);
    }

    pub fn intercept<R>(&self, call: &dyn CallRecord, invoke: impl FnOnce() -> R) -> R {
        let Some(_guard) = ReentrancyGuard::enter() else {
            return invoke();
        };

        self.check(self.server.before_call(call));
        let result = invoke();
        self.check(self.server.after_call(call));
        result
    }

    fn check(&self, flow: Flow) {
        if let Flow::Terminate(termination) = flow {
            (self.on_terminate)(termination);
        }
    }
}
