//! Integration tests for the in-memory channel
//!
//! These tests drive the codec and command queue across a thread boundary the
//! same way the in-process server does, without any OS pipes or sockets.

use std::io::IsTerminal;
use std::thread;

use eyre::Result;
use tracing_subscriber::EnvFilter;
use transport::{
    CommandQueue, DataRequest, DataResponse, Request, RequestBody, Response, ResponseBody,
    StateNode, StateValue,
    io::{Channel, InMemoryChannel},
    queue::DEFAULT_QUEUE_CAPACITY,
};

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

/// Mock traced program: answers every request until the client hangs up
fn mock_server(channel: InMemoryChannel) -> Result<Vec<Request>> {
    let (mut reader, mut writer) = channel.split()?;
    let queue = CommandQueue::spawn(DEFAULT_QUEUE_CAPACITY, move || {
        Request::recv(&mut reader)
            .inspect_err(|e| tracing::debug!(error = %e, "request stream ended"))
            .ok()
    })?;

    let mut seen = Vec::new();
    while let Some(request) = queue.get_item() {
        let body = match &request.body {
            RequestBody::Run => ResponseBody::Running { pid: 4242 },
            RequestBody::StateTree => ResponseBody::StateTree(
                StateNode::new("").with_child(
                    StateNode::new("GL_DEPTH_TEST")
                        .with_enum_name(0x0b71)
                        .with_value(StateValue::new("GLboolean", 1, vec![1])),
                ),
            ),
            RequestBody::Data(DataRequest::Buffer { object }) => {
                ResponseBody::Data(DataResponse::Buffer {
                    data: vec![*object as u8; 4],
                })
            }
            _ => ResponseBody::Ans { value: 0 },
        };
        Response::new(request.id, body).send(&mut writer)?;
        seen.push(request);
    }
    queue.stop()?;
    Ok(seen)
}

#[test]
fn test_requests_are_served_in_order() -> Result<()> {
    let (client, server) = InMemoryChannel::pair();
    let server_handle = thread::spawn(move || mock_server(server));

    let (mut reader, mut writer) = client.split()?;

    Request::new(1, RequestBody::Run).send(&mut writer)?;
    assert_eq!(
        Response::recv(&mut reader)?,
        Response::new(1, ResponseBody::Running { pid: 4242 })
    );

    Request::new(2, RequestBody::StateTree).send(&mut writer)?;
    let response = Response::recv(&mut reader)?;
    assert_eq!(response.id, 2);
    let ResponseBody::StateTree(root) = response.body else {
        panic!("expected a state tree, got {response:?}");
    };
    let depth_test = root.find("GL_DEPTH_TEST").expect("node present");
    assert_eq!(depth_test.value.data, vec![1]);

    Request::new(3, RequestBody::Data(DataRequest::Buffer { object: 9 })).send(&mut writer)?;
    let response = Response::recv(&mut reader)?;
    assert_eq!(
        response.body,
        ResponseBody::Data(DataResponse::Buffer { data: vec![9; 4] })
    );

    // hanging up ends the server's queue
    drop(writer);
    drop(reader);
    let seen = server_handle.join().expect("server panicked")?;
    let ids: Vec<_> = seen.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    Ok(())
}

#[test]
fn test_pipelined_requests_survive_small_queue() -> Result<()> {
    let (client, server) = InMemoryChannel::pair();
    let server_handle = thread::spawn(move || mock_server(server));
    let (mut reader, mut writer) = client.split()?;

    // more requests than the queue holds, sent before reading any reply
    for id in 10..30 {
        Request::new(
            id,
            RequestBody::SetBreakpoint {
                function: format!("glFunction{id}"),
                enabled: id % 2 == 0,
            },
        )
        .send(&mut writer)?;
    }
    for id in 10..30 {
        assert_eq!(
            Response::recv(&mut reader)?,
            Response::new(id, ResponseBody::Ans { value: 0 })
        );
    }

    drop(writer);
    let seen = server_handle.join().expect("server panicked")?;
    assert_eq!(seen.len(), 20);
    Ok(())
}
