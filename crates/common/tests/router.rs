//! Registry behaviour under concurrent registration and dispatch
use std::sync::Arc;

use common::protocol::{DecryptedRequest, ProtocolReply};
use common::router::{handler_fn, ActionRouter, DispatchError, HandlerError};
use futures::future::join_all;
use serde_json::json;

const REGISTRATIONS: usize = 200;
const DISPATCHES: usize = 400;

fn echo_screen(screen: String) -> impl common::router::Handler {
    handler_fn(move |request: DecryptedRequest| {
        let screen = screen.clone();
        async move {
            tokio::task::yield_now().await;
            Ok::<_, HandlerError>(ProtocolReply::navigate(request.version, screen, json!({})))
        }
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_and_dispatches() {
    let router = Arc::new(ActionRouter::new());
    router
        .register("FORM", echo_screen("FORM_DONE".to_string()))
        .unwrap();

    let registrations = (0..REGISTRATIONS).map(|i| {
        let router = router.clone();
        tokio::spawn(async move {
            router
                .register(format!("action_{}", i), echo_screen(format!("SCREEN_{}", i)))
                .unwrap();
        })
    });

    let dispatches = (0..DISPATCHES).map(|i| {
        let router = router.clone();
        tokio::spawn(async move {
            let request = match i % 3 {
                0 => DecryptedRequest::new("3.0", "ping"),
                1 => DecryptedRequest::new("3.0", "data_exchange").with_screen("FORM"),
                _ => DecryptedRequest::new("3.0", format!("action_{}", i % REGISTRATIONS)),
            };
            (i, router.dispatch(request).await)
        })
    });

    let (registered, dispatched) = tokio::join!(join_all(registrations), join_all(dispatches));
    for result in registered {
        result.unwrap();
    }
    for result in dispatched {
        let (i, reply) = result.unwrap();
        match i % 3 {
            0 => assert_eq!(reply.unwrap(), ProtocolReply::ping("3.0")),
            1 => assert_eq!(reply.unwrap().screen.as_deref(), Some("FORM_DONE")),
            // may race ahead of its registration
            _ => match reply {
                Ok(reply) => assert_eq!(
                    reply.screen,
                    Some(format!("SCREEN_{}", i % REGISTRATIONS))
                ),
                Err(err) => assert!(matches!(err, DispatchError::NoHandlerForRequest { .. })),
            },
        }
    }

    assert_eq!(router.registry().len(), REGISTRATIONS + 1);
    for i in 0..REGISTRATIONS {
        let request = DecryptedRequest::new("3.0", format!("action_{}", i));
        let reply = router.dispatch(request).await.unwrap();
        assert_eq!(reply.screen, Some(format!("SCREEN_{}", i)));
    }
}

#[tokio::test]
async fn test_slow_handler_does_not_block_registration() {
    let router = Arc::new(ActionRouter::new());
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    let release_rx = Arc::new(tokio::sync::Mutex::new(Some(release_rx)));

    router
        .register(
            "SLOW",
            handler_fn(move |request: DecryptedRequest| {
                let release_rx = release_rx.clone();
                async move {
                    let rx = release_rx.lock().await.take();
                    if let Some(rx) = rx {
                        let _ = rx.await;
                    }
                    Ok::<_, HandlerError>(ProtocolReply::navigate(
                        request.version,
                        "DONE",
                        json!({}),
                    ))
                }
            }),
        )
        .unwrap();

    let in_flight = {
        let router = router.clone();
        tokio::spawn(async move { router.dispatch(DecryptedRequest::new("3.0", "SLOW")).await })
    };
    tokio::task::yield_now().await;

    // Registry writes proceed while the handler is parked
    router
        .register("FAST", echo_screen("FAST_DONE".to_string()))
        .unwrap();
    assert!(router.registry().contains("FAST"));

    release_tx.send(()).unwrap();
    let reply = in_flight.await.unwrap().unwrap();
    assert_eq!(reply.screen.as_deref(), Some("DONE"));
}
