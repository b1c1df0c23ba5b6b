use std::io::Write;
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::thread::{self, ThreadId};

use eyre::WrapErr;
use transport::{
    Channel, CodecError, CommandQueue, CorrelationId, DataRequest, EventKind, Request,
    RequestBody, Response, ResponseBody, env, queue::DEFAULT_QUEUE_CAPACITY, tree,
};

use crate::backend::{Backend, CallRecord, DEBUGGER_MODULE, ObjectError};
use crate::breakpoints::BreakpointTable;

/// Error code carried by every error reply
pub const ERROR_CODE: u32 = 0;

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub queue_capacity: usize,
    /// Allow halting inside an atomic drawing block
    pub stop_in_atomic_block: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            stop_in_atomic_block: false,
        }
    }
}

impl ServerOptions {
    pub fn from_env() -> Self {
        let stop_in_atomic_block = std::env::var(env::STOP_IN_ATOMIC_BLOCK)
            .map(|value| matches!(value.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        Self {
            stop_in_atomic_block,
            ..Default::default()
        }
    }
}

/// Why the traced program has to end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The client asked for it
    Quit,
    /// The channel closed or carried something undecodable
    ChannelLost,
}

impl Termination {
    pub fn exit_code(self) -> i32 {
        match self {
            Termination::Quit => 0,
            Termination::ChannelLost => 1,
        }
    }

    pub fn exit(self) -> ! {
        tracing::info!(reason = ?self, "terminating traced program");
        std::process::exit(self.exit_code())
    }
}

/// What the interception wrapper should do after a server entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Proceed,
    Terminate(Termination),
}

struct Session {
    breakpoints: BreakpointTable,
    stopped: bool,
    break_on_next: bool,
    /// id of the run/continue/step that started the current execution span
    start_id: CorrelationId,
    stop_in_atomic_block: bool,
    output: Box<dyn Write + Send>,
}

impl Session {
    fn reply(&mut self, id: CorrelationId, body: ResponseBody) -> Result<(), CodecError> {
        tracing::debug!(id, code = body.code(), "sending response");
        Response::new(id, body).send(&mut self.output)
    }

    fn reply_error(&mut self, id: CorrelationId, message: impl Into<String>) -> Result<(), CodecError> {
        let message = message.into();
        tracing::debug!(id, %message, "sending error");
        self.reply(
            id,
            ResponseBody::Error {
                code: ERROR_CODE,
                message,
            },
        )
    }

    fn ack(&mut self, id: CorrelationId) -> Result<(), CodecError> {
        self.reply(id, ResponseBody::Ans { value: 0 })
    }

    fn halt(&mut self, call: Option<&dyn CallRecord>) -> Result<(), CodecError> {
        self.stopped = true;
        self.break_on_next = false;
        let call = render(call);
        tracing::debug!(%call, "halting");
        self.reply(self.start_id, ResponseBody::Break { call })
    }
}

fn render(call: Option<&dyn CallRecord>) -> String {
    call.map(|call| call.dump())
        .unwrap_or_else(|| "No call".to_string())
}

/// The in-process half of a debugging session
///
/// Owns the server end of the channel, the breakpoint table and the halt
/// state. Only the first thread to enter the server is serviced; every other
/// thread passes through untouched.
pub struct CommandServer<B> {
    backend: B,
    debug_thread: OnceLock<ThreadId>,
    /// read outside the session lock, so a halted loop never holds it while waiting
    requests: CommandQueue<Request>,
    session: Mutex<Session>,
    pid: u64,
}

impl<B: Backend> CommandServer<B> {
    /// Take ownership of the channel and start the command reader
    ///
    /// The server starts halted; call [`start`](Self::start) to service the
    /// requests the client sends before the program runs.
    pub fn new<C: Channel>(backend: B, channel: C, options: ServerOptions) -> eyre::Result<Self> {
        let (mut reader, writer) = channel.split().wrap_err("splitting debugger channel")?;

        let requests = CommandQueue::spawn(options.queue_capacity, move || {
            match Request::recv(&mut reader) {
                Ok(request) => {
                    tracing::trace!(id = request.id, code = request.body.code(), "request received");
                    Some(request)
                }
                Err(e) if e.is_closed() => {
                    tracing::debug!("debugger channel closed");
                    None
                }
                Err(e) => {
                    tracing::error!(error = %e, "protocol desynchronised");
                    None
                }
            }
        })
        .wrap_err("starting command reader")?;

        let session = Session {
            breakpoints: BreakpointTable::new(backend.function_count()),
            stopped: true,
            break_on_next: false,
            start_id: 0,
            stop_in_atomic_block: options.stop_in_atomic_block,
            output: Box::new(writer),
        };

        Ok(Self {
            backend,
            debug_thread: OnceLock::new(),
            requests,
            session: Mutex::new(session),
            pid: u64::from(std::process::id()),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    /// Whether a request is waiting that the next call would service
    pub fn has_pending_requests(&self) -> bool {
        self.requests.has_data()
    }

    /// Run the command loop before any call has been made
    ///
    /// Returns once the client has sent run (or continue or step). The debug
    /// thread is not chosen here: it is whichever thread makes the first
    /// intercepted call.
    #[tracing::instrument(skip(self))]
    pub fn start(&self) -> Flow {
        let current = thread::current().id();
        if self.debug_thread.get().is_some_and(|id| *id != current) {
            tracing::warn!("server started from a thread other than the debug thread");
            return Flow::Proceed;
        }
        self.command_loop(self.lock(), None)
    }

    /// Hook run immediately before a call is dispatched
    pub fn before_call(&self, call: &dyn CallRecord) -> Flow {
        if !self.is_debug_thread() {
            return Flow::Proceed;
        }
        let mut session = self.lock();

        if self.stoppable(&session)
            && (session.breakpoints.breaks_on(call.id()) || session.break_on_next)
            && session.halt(Some(call)).is_err()
        {
            return Flow::Terminate(Termination::ChannelLost);
        }
        self.command_loop(session, Some(call))
    }

    /// Hook run immediately after a call, once its errors are known
    pub fn after_call(&self, call: &dyn CallRecord) -> Flow {
        if !self.is_debug_thread() {
            return Flow::Proceed;
        }
        let mut session = self.lock();

        let fired = session
            .breakpoints
            .enabled_events()
            .find_map(|event| self.backend.detect_event(call, event));
        let Some(event) = fired else {
            return Flow::Proceed;
        };

        tracing::debug!(call = call.name(), %event, "halting on event");
        session.stopped = true;
        session.break_on_next = false;
        let body = ResponseBody::BreakEvent {
            call: call.dump(),
            event,
        };
        let start_id = session.start_id;
        if session.reply(start_id, body).is_err() {
            return Flow::Terminate(Termination::ChannelLost);
        }
        self.command_loop(session, Some(call))
    }

    fn is_debug_thread(&self) -> bool {
        let current = thread::current().id();
        *self.debug_thread.get_or_init(|| current) == current
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        // a panic while halted leaves the table intact, so keep going
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn stoppable(&self, session: &Session) -> bool {
        session.stop_in_atomic_block || !self.backend.in_atomic_block()
    }

    /// Service requests: block while halted, otherwise only drain what is queued
    fn command_loop<'a>(
        &'a self,
        mut session: MutexGuard<'a, Session>,
        call: Option<&dyn CallRecord>,
    ) -> Flow {
        if call.is_some() && self.backend.is_query_safe() {
            self.backend.finish_rendering();
        }

        loop {
            if !session.stopped && !self.requests.has_data() {
                return Flow::Proceed;
            }
            // status queries from other threads must not wait on a halted program
            drop(session);
            let request = self.requests.get_item();
            session = self.lock();
            let Some(request) = request else {
                return Flow::Terminate(Termination::ChannelLost);
            };

            match self.process(&mut session, request, call) {
                Ok(None) => {}
                Ok(Some(termination)) => return Flow::Terminate(termination),
                Err(e) => {
                    tracing::error!(error = %e, "writing to debugger channel");
                    return Flow::Terminate(Termination::ChannelLost);
                }
            }

            if !session.stopped {
                return Flow::Proceed;
            }
        }
    }

    #[tracing::instrument(skip(self, session, request, call), fields(id = request.id, code = request.body.code()))]
    fn process(
        &self,
        session: &mut Session,
        request: Request,
        call: Option<&dyn CallRecord>,
    ) -> Result<Option<Termination>, CodecError> {
        let id = request.id;
        match request.body {
            RequestBody::Run => {
                session.reply(id, ResponseBody::Running { pid: self.pid })?;
                resume(session, id, false);
            }
            RequestBody::Continue => resume(session, id, false),
            RequestBody::Step => resume(session, id, true),
            RequestBody::Quit => return Ok(Some(Termination::Quit)),
            RequestBody::SetBreakpoint { function, enabled } => {
                match self.backend.function_id(&function) {
                    Some(call_id) => {
                        session.breakpoints.set_call(call_id, enabled);
                        session.ack(id)?;
                    }
                    None => session.reply_error(id, format!("Unknown function {function}"))?,
                }
            }
            RequestBody::SetBreakEvent { event, enabled } => match EventKind::from_code(event) {
                Some(event) => {
                    session.breakpoints.set_event(event, enabled);
                    session.ack(id)?;
                }
                None => session.reply_error(id, "Event out of range - protocol mismatch?")?,
            },
            RequestBody::ActivateModule { name } => self.toggle_module(session, id, &name, true)?,
            RequestBody::DeactivateModule { name } => {
                self.toggle_module(session, id, &name, false)?
            }
            RequestBody::StateTree => self.send_state(session, id)?,
            RequestBody::Data(data) => self.send_data(session, id, &data)?,
            RequestBody::Async => {
                if !session.stopped {
                    if self.stoppable(session) {
                        session.halt(call)?;
                    } else {
                        session.break_on_next = true;
                    }
                }
            }
        }
        Ok(None)
    }

    fn toggle_module(
        &self,
        session: &mut Session,
        id: CorrelationId,
        name: &str,
        activate: bool,
    ) -> Result<(), CodecError> {
        let Some(status) = self.backend.module_status(name) else {
            return session.reply_error(id, format!("Unknown module {name}"));
        };
        if name == DEBUGGER_MODULE {
            return session.reply_error(id, "Cannot activate or deactivate the debugger");
        }
        if !status.loaded {
            return session.reply_error(
                id,
                format!("Module {name} is not loaded; it must be loaded at program start"),
            );
        }
        if status.active == activate {
            let state = if activate { "active" } else { "inactive" };
            return session.reply_error(id, format!("Module {name} is already {state}"));
        }

        self.backend.set_module_active(name, activate);
        session.ack(id)
    }

    fn send_state(&self, session: &mut Session, id: CorrelationId) -> Result<(), CodecError> {
        if !self.backend.is_query_safe() {
            return session.reply_error(id, "In glBegin/glEnd; no state available");
        }
        let root = self.backend.state_root();
        let nodes = tree::write_tree(&mut session.output, id, root.as_ref())?;
        session.output.flush()?;
        tracing::debug!(id, nodes, "state tree sent");
        Ok(())
    }

    fn send_data(
        &self,
        session: &mut Session,
        id: CorrelationId,
        request: &DataRequest,
    ) -> Result<(), CodecError> {
        let result = if self.backend.is_query_safe() {
            self.backend.read_object(request)
        } else {
            Err(ObjectError::UnsafeState)
        };
        match result {
            Ok(data) => session.reply(id, ResponseBody::Data(data)),
            Err(e) => {
                tracing::debug!(kind = %request.kind(), object = request.object(), error = %e, "object read failed");
                session.reply_error(id, e.to_string())
            }
        }
    }
}

fn resume(session: &mut Session, id: CorrelationId, step: bool) {
    session.break_on_next = step;
    session.stopped = false;
    session.start_id = id;
}
