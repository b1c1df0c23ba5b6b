use std::io::{IsTerminal, Read};
use std::net::TcpListener;
use std::thread;

use eyre::Context;
use launcher::{ProgramSettings, TargetKind, launch};
use tracing_subscriber::EnvFilter;
use transport::{Request, RequestBody, bindings::get_random_tcp_port, io::Channel};

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

fn local(command: &str) -> ProgramSettings {
    ProgramSettings {
        target: TargetKind::Local,
        command: Some(command.to_string()),
        // nothing to inject into the shell utilities used here
        preload: None,
        ..Default::default()
    }
}

#[cfg(unix)]
#[test]
fn local_program_talks_over_inherited_descriptors() -> eyre::Result<()> {
    let launched = launch(&local(r#"cat <&"$GLDB_FD_IN" >&"$GLDB_FD_OUT""#))?;
    assert!(launched.process.is_some());

    let (mut reader, mut writer) = launched.channel.split()?;
    let request = Request::new(
        4,
        RequestBody::SetBreakpoint {
            function: "glDrawArrays".to_string(),
            enabled: true,
        },
    );
    request.send(&mut writer)?;

    let echoed = Request::recv(&mut reader).wrap_err("reading echoed request")?;
    assert_eq!(echoed, request);
    Ok(())
}

#[cfg(unix)]
#[test]
fn local_program_sees_chain_and_display() -> eyre::Result<()> {
    let settings = ProgramSettings {
        chain: Some("showstats".to_string()),
        display: Some(":7".to_string()),
        ..local(r#"printf '%s %s %s' "$GLDB_CHANNEL" "$GLDB_CHAIN" "$DISPLAY" >&"$GLDB_FD_OUT""#)
    };
    let launched = launch(&settings)?;
    let mut process = launched.process.expect("local targets are spawned");

    let (mut reader, _writer) = launched.channel.split()?;
    let mut output = String::new();
    reader.read_to_string(&mut output)?;
    assert_eq!(output, "fd showstats :7");
    assert!(process.wait()?.success());
    Ok(())
}

#[cfg(unix)]
#[test]
fn terminate_stops_a_running_program() -> eyre::Result<()> {
    let launched = launch(&local("sleep 30"))?;
    let mut process = launched.process.expect("local targets are spawned");
    assert!(process.try_wait()?.is_none());

    process.terminate()?;
    assert!(process.try_wait()?.is_some());
    Ok(())
}

#[test]
fn tcp_target_connects_to_a_listener() -> eyre::Result<()> {
    let port = get_random_tcp_port().context("reserving custom port")?;
    let listener = TcpListener::bind(("127.0.0.1", port))?;
    let server = thread::spawn(move || listener.accept().map(|(_, peer)| peer));

    let launched = launch(&ProgramSettings {
        target: TargetKind::Tcp,
        host: Some("127.0.0.1".to_string()),
        port: Some(port),
        ..Default::default()
    })?;
    assert!(launched.process.is_none());

    let peer = server.join().expect("listener thread panicked")?;
    assert!(peer.ip().is_loopback());
    Ok(())
}

#[test]
fn invalid_settings_are_rejected_before_spawning() {
    let err = launch(&ProgramSettings {
        target: TargetKind::Tcp,
        host: Some("localhost".to_string()),
        ..Default::default()
    })
    .err()
    .expect("port is required");
    assert_eq!(err.to_string(), "Port not set");
}
