//! Tests for channel implementations

use super::*;

#[test]
fn test_channels_implement_trait() {
    fn _assert_impl<T: Channel>() {}
    _assert_impl::<TcpChannel>();
    _assert_impl::<InMemoryChannel>();
    _assert_impl::<BoxedChannel>();
    #[cfg(unix)]
    _assert_impl::<PipeChannel>();
}

#[test]
fn test_boxed_channel_forwards() -> eyre::Result<()> {
    let (client, server) = InMemoryChannel::pair();
    let boxed = BoxedChannel::from_channel(client)?;
    let (_reader, mut writer) = boxed.split()?;
    let (mut server_reader, _server_writer) = server.split()?;

    writer.write_all(b"ping")?;
    let mut buf = [0u8; 4];
    server_reader.read_exact(&mut buf)?;
    assert_eq!(&buf, b"ping");
    Ok(())
}
