//! Tests for the transport layer
//!
//! These tests verify framing over in-memory and TCP channels, ordering,
//! half-close and size limits.

#[cfg(test)]
mod tests {
    use crate::protocol::{CallHeader, CallShape, Envelope, Frame, RpcError, Status};
    use crate::transport::{connect_tcp, ChannelConfig, Codec, MessageChannel};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_frames_arrive_in_send_order() {
        let (a, b) = MessageChannel::pair(Codec::Postcard, 1024);

        for i in 0..50u8 {
            a.send(&Frame::Message(Envelope::more(vec![i]))).await.unwrap();
        }

        for i in 0..50u8 {
            let frame = b.recv().await.unwrap().unwrap();
            assert_eq!(frame, Frame::Message(Envelope::more(vec![i])));
        }
    }

    #[tokio::test]
    async fn test_directions_are_independent() {
        let (a, b) = MessageChannel::pair(Codec::Json, 1024);

        a.send(&Frame::HalfClose).await.unwrap();
        b.send(&Frame::Trailer(Status::ok())).await.unwrap();

        assert_eq!(a.recv().await.unwrap(), Some(Frame::Trailer(Status::ok())));
        assert_eq!(b.recv().await.unwrap(), Some(Frame::HalfClose));
    }

    #[tokio::test]
    async fn test_concurrent_send_and_recv_on_one_channel() {
        let (a, b) = MessageChannel::pair(Codec::Postcard, 64);

        // `a` is read and written from two tasks at once.
        let reader = {
            let a = a.clone();
            tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(Frame::Message(env)) = a.recv().await.unwrap() {
                    seen.push(env.payload[0]);
                    if env.end_of_stream {
                        break;
                    }
                }
                seen
            })
        };
        let echo = tokio::spawn(async move {
            for i in 0..20u8 {
                let frame = b.recv().await.unwrap().unwrap();
                assert_eq!(frame, Frame::Message(Envelope::more(vec![i])));
                let reply = if i == 19 {
                    Envelope::last(vec![i])
                } else {
                    Envelope::more(vec![i])
                };
                b.send(&Frame::Message(reply)).await.unwrap();
            }
        });

        for i in 0..20u8 {
            a.send(&Frame::Message(Envelope::more(vec![i]))).await.unwrap();
        }

        echo.await.unwrap();
        assert_eq!(reader.await.unwrap(), (0..20u8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_shutdown_is_seen_as_clean_close() {
        let (a, b) = MessageChannel::pair(Codec::Postcard, 1024);

        a.send(&Frame::HalfClose).await.unwrap();
        a.shutdown().await.unwrap();
        a.shutdown().await.unwrap();

        assert_eq!(b.recv().await.unwrap(), Some(Frame::HalfClose));
        assert_eq!(b.recv().await.unwrap(), None);

        // The other direction still works.
        b.send(&Frame::Trailer(Status::ok())).await.unwrap();
        assert_eq!(a.recv().await.unwrap(), Some(Frame::Trailer(Status::ok())));
    }

    #[tokio::test]
    async fn test_send_after_shutdown_fails() {
        let (a, _b) = MessageChannel::pair(Codec::Postcard, 1024);
        a.shutdown().await.unwrap();
        let err = a.send(&Frame::HalfClose).await.unwrap_err();
        assert!(matches!(err, RpcError::Connection(_)));
    }

    #[tokio::test]
    async fn test_dropped_send_still_writes_whole_frame() {
        let (a, b) = MessageChannel::pair(Codec::Postcard, 256);
        let big = Frame::Message(Envelope::more(vec![7; 2000]));

        // The send blocks on the full buffer and is dropped mid-frame.
        let dropped = tokio::time::timeout(Duration::from_millis(20), a.send(&big)).await;
        assert!(dropped.is_err());

        let cancel = Frame::Cancel(Status::invalid_argument("caller gave up"));
        let sender = a.clone();
        let follow_up = {
            let cancel = cancel.clone();
            tokio::spawn(async move { sender.send(&cancel).await })
        };

        assert_eq!(b.recv().await.unwrap(), Some(big));
        assert_eq!(b.recv().await.unwrap(), Some(cancel));
        follow_up.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected_on_send() {
        let (left, _right) = tokio::io::duplex(1024);
        let config = ChannelConfig {
            codec: Codec::Postcard,
            max_frame_size: 16,
        };
        let channel = MessageChannel::from_io(left, config, "test");

        let err = channel
            .send(&Frame::Message(Envelope::more(vec![0; 64])))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::FrameTooLarge { max: 16, .. }));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected_on_recv() {
        let (mut raw, right) = tokio::io::duplex(1024);
        let config = ChannelConfig {
            codec: Codec::Postcard,
            max_frame_size: 16,
        };
        let channel = MessageChannel::from_io(right, config, "test");

        raw.write_all(&1000u32.to_be_bytes()).await.unwrap();

        let err = channel.recv().await.unwrap_err();
        assert!(matches!(err, RpcError::FrameTooLarge { len: 1000, max: 16 }));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_connection_closed() {
        let (mut raw, right) = tokio::io::duplex(1024);
        let channel = MessageChannel::from_io(right, ChannelConfig::default(), "test");

        raw.write_all(&10u32.to_be_bytes()).await.unwrap();
        raw.write_all(&[1, 2, 3]).await.unwrap();
        drop(raw);

        let err = channel.recv().await.unwrap_err();
        assert!(matches!(err, RpcError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_tcp_channel_round_trip() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let channel = MessageChannel::from_tcp(stream, ChannelConfig::default());
            let frame = channel.recv().await.unwrap().unwrap();
            channel.send(&frame).await.unwrap();
        });

        let channel = connect_tcp(&addr, ChannelConfig::default(), Duration::from_secs(2))
            .await
            .unwrap();
        let open = Frame::Open(CallHeader::new("greet.Greet", CallShape::Unary));
        channel.send(&open).await.unwrap();
        assert_eq!(channel.recv().await.unwrap(), Some(open));

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = connect_tcp(&addr, ChannelConfig::default(), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Connection(_)));
    }
}
