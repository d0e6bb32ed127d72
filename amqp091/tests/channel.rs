use std::time::Duration;

use amqp091::{
    channel::Error,
    types::{
        definitions::ReplyCode,
        methods::{channel, connection, Method},
        states::ChannelState,
    },
};

mod common;

#[tokio::test]
async fn first_channel_is_number_one() {
    let (connection, mut server) = common::connect().await;

    let script = async {
        match server.expect(1).await {
            Method::ChannelOpen(_) => {}
            other => panic!("expected channel.open, found {:?}", other),
        }
        server.send(1, common::channel_open_ok()).await;
    };
    let (channel, _) = tokio::join!(connection.create_channel(), script);
    let channel = channel.unwrap();
    assert_eq!(channel.id(), 1);
    assert_eq!(channel.state(), ChannelState::Open);

    let (second, id) = tokio::join!(connection.create_channel(), server.accept_channel());
    assert_eq!(second.unwrap().id(), 2);
    assert_eq!(id, 2);
}

#[tokio::test]
async fn concurrent_opens_get_distinct_ids() {
    let (connection, mut server) = common::connect().await;

    let script = async {
        let a = server.accept_channel().await;
        let b = server.accept_channel().await;
        (a, b)
    };
    let (first, second, (a, b)) =
        tokio::join!(connection.create_channel(), connection.create_channel(), script);
    let (first, second) = (first.unwrap(), second.unwrap());

    let mut ids = vec![first.id(), second.id()];
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);
    assert_ne!(a, b);
}

#[tokio::test]
async fn close_releases_the_id() {
    let (connection, mut server) = common::connect().await;
    let (channel, _) = tokio::join!(connection.create_channel(), server.accept_channel());
    let mut channel = channel.unwrap();

    let script = async {
        match server.expect(1).await {
            Method::ChannelClose(close) => {
                assert_eq!(close.reply_code, 200);
                assert_eq!(close.reply_text.as_str(), "Goodbye");
            }
            other => panic!("expected channel.close, found {:?}", other),
        }
        server.send(1, channel::CloseOk {}).await;
    };
    let (result, _) = tokio::join!(channel.close(), script);
    result.unwrap();
    assert_eq!(channel.state(), ChannelState::Closed);

    // Closing again is a no-op
    channel.close().await.unwrap();

    let (reopened, id) = tokio::join!(connection.create_channel(), server.accept_channel());
    assert_eq!(reopened.unwrap().id(), 1);
    assert_eq!(id, 1);
}

#[tokio::test]
async fn refused_open_reports_the_reason() {
    let (connection, mut server) = common::connect().await;

    let script = async {
        assert!(matches!(server.expect(1).await, Method::ChannelOpen(_)));
        let close = channel::Close::new(ReplyCode::AccessRefused, "ACCESS_REFUSED");
        server.send(1, close).await;
        assert!(matches!(server.expect(1).await, Method::ChannelCloseOk(_)));
    };
    let (result, _) = tokio::join!(connection.create_channel(), script);
    match result {
        Err(Error::ChannelOpenFailed(reason)) => {
            assert_eq!(reason.reply_code, 403);
            assert_eq!(reason.reply_text.as_str(), "ACCESS_REFUSED");
        }
        other => panic!("expected ChannelOpenFailed, found {:?}", other),
    }

    // The id was released
    let (channel, _) = tokio::join!(connection.create_channel(), server.accept_channel());
    assert_eq!(channel.unwrap().id(), 1);
}

#[tokio::test]
async fn server_close_of_an_open_channel() {
    let (connection, mut server) = common::connect().await;
    let (channel, _) = tokio::join!(connection.create_channel(), server.accept_channel());
    let mut channel = channel.unwrap();

    let close = channel::Close::new(ReplyCode::PreconditionFailed, "PRECONDITION_FAILED");
    server.send(1, close).await;
    assert!(matches!(server.expect(1).await, Method::ChannelCloseOk(_)));

    // The next open is handled after the close, so the id is free again
    let (other, _) = tokio::join!(connection.create_channel(), server.accept_channel());
    assert_eq!(other.unwrap().id(), 1);

    assert_eq!(channel.state(), ChannelState::Closed);
    channel.close().await.unwrap();
    match channel.flow(true).await {
        Err(Error::ChannelClosed(None)) => {}
        other => panic!("expected ChannelClosed, found {:?}", other),
    }
}

#[tokio::test]
async fn server_close_fails_pending_request() {
    let (connection, mut server) = common::connect().await;
    let (channel, _) = tokio::join!(connection.create_channel(), server.accept_channel());
    let mut channel = channel.unwrap();

    let script = async {
        assert!(matches!(server.expect(1).await, Method::ChannelFlow(_)));
        let close = channel::Close::new(ReplyCode::PreconditionFailed, "PRECONDITION_FAILED");
        server.send(1, close).await;
        assert!(matches!(server.expect(1).await, Method::ChannelCloseOk(_)));
    };
    let (result, _) = tokio::join!(channel.flow(false), script);
    match result {
        Err(Error::ChannelClosed(Some(reason))) => assert_eq!(reason.reply_code, 406),
        other => panic!("expected ChannelClosed, found {:?}", other),
    }
}

#[tokio::test]
async fn flow_returns_confirmed_state() {
    let (connection, mut server) = common::connect().await;
    let (channel, _) = tokio::join!(connection.create_channel(), server.accept_channel());
    let mut channel = channel.unwrap();

    let script = async {
        match server.expect(1).await {
            Method::ChannelFlow(flow) => assert!(!flow.active),
            other => panic!("expected channel.flow, found {:?}", other),
        }
        server.send(1, channel::FlowOk { active: false }).await;
    };
    let (result, _) = tokio::join!(channel.flow(false), script);
    assert!(!result.unwrap());
}

#[tokio::test]
async fn server_flow_is_acknowledged() {
    let (connection, mut server) = common::connect().await;
    let (channel, _) = tokio::join!(connection.create_channel(), server.accept_channel());
    let _channel = channel.unwrap();

    server.send(1, channel::Flow { active: false }).await;
    match server.expect(1).await {
        Method::ChannelFlowOk(flow_ok) => assert!(!flow_ok.active),
        other => panic!("expected channel.flow-ok, found {:?}", other),
    }
}

#[tokio::test]
async fn request_times_out_and_channel_stays_usable() {
    let builder = common::builder().rpc_timeout(Duration::from_millis(100));
    let (connection, mut server) =
        common::connect_with(builder, common::tune(2047, 131_072, 0)).await;
    let (channel, _) = tokio::join!(connection.create_channel(), server.accept_channel());
    let mut channel = channel.unwrap();

    let script = async {
        // Never answered
        assert!(matches!(server.expect(1).await, Method::ChannelFlow(_)));
    };
    let (result, _) = tokio::join!(channel.flow(false), script);
    assert_eq!(result, Err(Error::Timeout));
    assert!(channel.is_open());

    let script = async {
        assert!(matches!(server.expect(1).await, Method::ChannelFlow(_)));
        server.send(1, channel::FlowOk { active: true }).await;
    };
    let (result, _) = tokio::join!(channel.flow(true), script);
    assert!(result.unwrap());
}

#[tokio::test]
async fn close_after_timed_out_close_completes() {
    let builder = common::builder().rpc_timeout(Duration::from_millis(100));
    let (connection, mut server) =
        common::connect_with(builder, common::tune(2047, 131_072, 0)).await;
    let (channel, _) = tokio::join!(connection.create_channel(), server.accept_channel());
    let mut channel = channel.unwrap();

    let script = async {
        // Not answered in time
        assert!(matches!(server.expect(1).await, Method::ChannelClose(_)));
    };
    let (result, _) = tokio::join!(channel.close(), script);
    assert_eq!(result, Err(Error::Timeout));
    assert_eq!(channel.state(), ChannelState::Closing);

    // Still waiting on the same exchange, so no second channel.close is sent
    let (result, _) = tokio::join!(channel.close(), server.send(1, channel::CloseOk {}));
    result.unwrap();
    assert_eq!(channel.state(), ChannelState::Closed);

    channel.close().await.unwrap();
    let (reopened, id) = tokio::join!(connection.create_channel(), server.accept_channel());
    assert_eq!(reopened.unwrap().id(), 1);
    assert_eq!(id, 1);
}

#[tokio::test]
async fn connection_close_fails_pending_request() {
    let (connection, mut server) = common::connect().await;
    let (channel, _) = tokio::join!(connection.create_channel(), server.accept_channel());
    let mut channel = channel.unwrap();

    let script = async {
        assert!(matches!(server.expect(1).await, Method::ChannelFlow(_)));
        let close = connection::Close::new(ReplyCode::ConnectionForced, "CONNECTION_FORCED");
        server.send(0, close).await;
        assert!(matches!(server.expect(0).await, Method::ConnectionCloseOk(_)));
    };
    let (result, _) = tokio::join!(channel.flow(false), script);
    match result {
        Err(Error::ConnectionClosed(Some(reason))) => assert_eq!(reason.reply_code, 320),
        other => panic!("expected ConnectionClosed, found {:?}", other),
    }
    assert_eq!(channel.state(), ChannelState::Closed);
}

#[tokio::test]
async fn channel_max_limits_open_channels() {
    let (connection, mut server) =
        common::connect_with(common::builder(), common::tune(1, 131_072, 0)).await;
    let (first, _) = tokio::join!(connection.create_channel(), server.accept_channel());
    let _first = first.unwrap();

    match connection.create_channel().await {
        Err(Error::Exhausted(err)) => assert_eq!(err.channel_max, 1),
        other => panic!("expected Exhausted, found {:?}", other),
    }
}

#[tokio::test]
async fn dropping_an_open_channel_closes_it() {
    let (connection, mut server) = common::connect().await;
    let (channel, _) = tokio::join!(connection.create_channel(), server.accept_channel());
    drop(channel.unwrap());

    assert!(matches!(server.expect(1).await, Method::ChannelClose(_)));
    server.send(1, channel::CloseOk {}).await;

    let (reopened, _) = tokio::join!(connection.create_channel(), server.accept_channel());
    assert_eq!(reopened.unwrap().id(), 1);
}

#[tokio::test]
async fn content_frames_are_dropped() {
    use amqp091::frames::{Frame, FrameBody};

    let (connection, mut server) = common::connect().await;
    let (channel, _) = tokio::join!(connection.create_channel(), server.accept_channel());
    let mut channel = channel.unwrap();

    server
        .send_frame(Frame::new(1u16, FrameBody::Body(bytes::Bytes::from_static(b"payload"))))
        .await;
    let script = async {
        assert!(matches!(server.expect(1).await, Method::ChannelFlow(_)));
        server.send(1, channel::FlowOk { active: true }).await;
    };
    let (result, _) = tokio::join!(channel.flow(true), script);
    assert!(result.unwrap());
}
