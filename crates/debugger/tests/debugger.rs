use std::io::IsTerminal;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use debugger::{Session, Status, render_value};
use launcher::ProgramSettings;
use server::testing::FakeBackend;
use server::{CommandServer, Flow, ServerOptions, Termination};
use tracing_subscriber::EnvFilter;
use transport::{DataRequest, DataResponse, EventKind, ResponseBody, io::InMemoryChannel};

#[ctor::ctor]
fn init() {
    let in_ci = std::env::var("CI")
        .map(|val| val == "true")
        .unwrap_or(false);

    if std::io::stderr().is_terminal() || in_ci {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .json()
            .try_init();
    }

    let _ = color_eyre::install();
}

/// A traced program that clears and draws until it is told to stop
fn spawn_program(channel: InMemoryChannel) -> JoinHandle<Termination> {
    thread::spawn(move || {
        let backend = FakeBackend::new(&["glClear", "glDrawArrays", "glGetError"]);
        backend.add_buffer(1, vec![0xff; 16]);
        let server = CommandServer::new(backend, channel, ServerOptions::default())
            .expect("server starts");

        if let Flow::Terminate(termination) = server.start() {
            return termination;
        }
        loop {
            let frame = [
                ("glClear", "GL_COLOR_BUFFER_BIT"),
                ("glDrawArrays", "GL_TRIANGLES, 0, 3"),
            ];
            for (name, args) in frame {
                let call = server.backend().call(name, args);
                for flow in [server.before_call(&call), server.after_call(&call)] {
                    if let Flow::Terminate(termination) = flow {
                        return termination;
                    }
                }
            }
            thread::sleep(Duration::from_millis(1));
        }
    })
}

/// Read responses until the session reaches `status`, returning what was seen
fn wait_for(session: &mut Session, status: Status) -> eyre::Result<Vec<ResponseBody>> {
    let mut seen = Vec::new();
    for _ in 0..100 {
        if session.status() == status {
            return Ok(seen);
        }
        let response = session
            .recv_response_timeout(Duration::from_secs(5))?
            .ok_or_else(|| eyre::eyre!("timed out waiting for {status}"))?;
        seen.push(response.body);
    }
    eyre::bail!("never reached {status}")
}

#[test]
fn break_inspect_continue_quit() -> eyre::Result<()> {
    let (client, program) = InMemoryChannel::pair();
    let program = spawn_program(program);

    let mut session = Session::new(ProgramSettings::default());
    session.set_breakpoint("glDrawArrays", true)?;
    let run_id = session.run_on(client, None)?;
    assert_eq!(session.status(), Status::Started);

    wait_for(&mut session, Status::Running)?;
    assert_eq!(session.pid(), Some(u64::from(std::process::id())));

    let seen = wait_for(&mut session, Status::Stopped)?;
    assert_eq!(
        seen.last(),
        Some(&ResponseBody::Break {
            call: "glDrawArrays(GL_TRIANGLES, 0, 3)".to_string()
        })
    );

    let blend = session
        .state_tree()?
        .find("GL_BLEND")
        .ok_or_else(|| eyre::eyre!("GL_BLEND missing from state"))?;
    assert_eq!(render_value(&blend.value), "GL_FALSE");

    let data = session.fetch_data(DataRequest::Buffer { object: 1 })?;
    assert_eq!(
        data,
        DataResponse::Buffer {
            data: vec![0xff; 16]
        }
    );
    let err = session
        .fetch_data(DataRequest::Buffer { object: 9 })
        .expect_err("buffer 9 does not exist");
    assert!(err.to_string().contains("invalid buffer id"));
    assert_eq!(session.status(), Status::Stopped);

    let resume = session.send_continue()?;
    assert!(!session.has_cached_state());
    wait_for(&mut session, Status::Stopped)?;
    assert_ne!(resume, run_id);

    session.kill()?;
    assert_eq!(session.status(), Status::Dead);
    assert_eq!(program.join().expect("program panicked"), Termination::Quit);
    Ok(())
}

#[test]
fn interrupt_and_step() -> eyre::Result<()> {
    let (client, program) = InMemoryChannel::pair();
    let program = spawn_program(program);

    let mut session = Session::new(ProgramSettings::default());
    session.set_break_event(EventKind::GlError, false)?;
    session.run_on(client, None)?;
    wait_for(&mut session, Status::Running)?;

    session.send_async()?;
    wait_for(&mut session, Status::Stopped)?;

    session.send_step()?;
    let seen = wait_for(&mut session, Status::Stopped)?;
    assert!(matches!(seen.last(), Some(ResponseBody::Break { .. })));

    let unknown = session.set_breakpoint("glFrobnicate", true)?;
    assert!(unknown.is_some());
    let module = session.send_module("wireframe", true)?;
    let mut errors = Vec::new();
    while errors.len() < 2 {
        let response = session
            .recv_response_timeout(Duration::from_secs(5))?
            .ok_or_else(|| eyre::eyre!("no reply"))?;
        if let ResponseBody::Error { message, .. } = response.body {
            errors.push((response.id, message));
        }
    }
    assert_eq!(
        errors,
        vec![
            (unknown.unwrap_or_default(), "Unknown function glFrobnicate".to_string()),
            (module, "Unknown module wireframe".to_string()),
        ]
    );

    drop(session);
    assert_eq!(program.join().expect("program panicked"), Termination::Quit);
    Ok(())
}

#[test]
fn program_exit_is_noticed() -> eyre::Result<()> {
    let (client, program) = InMemoryChannel::pair();

    let mut session = Session::new(ProgramSettings::default());
    session.run_on(client, None)?;
    drop(program);

    while session.status() != Status::Dead {
        if session.recv_response_timeout(Duration::from_secs(5)).is_err() {
            break;
        }
    }
    assert_eq!(session.status(), Status::Dead);
    Ok(())
}
