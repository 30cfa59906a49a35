use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use proptest::prelude::*;
use rand::seq::SliceRandom;
use rpc::{HandlerError, HandlerResult, RpcClient, RpcError, RpcHandler};
use transport::{BasicProperties, Channel, MemoryBroker, MemoryChannel, TransportError};

use crate::harness::{batcher, reply, serve, sink, Echo, HandlerServer};
use crate::init_tracing;

const WAIT: Duration = Duration::from_secs(5);

fn open_client(broker: &MemoryBroker, timeout: Duration) -> RpcClient<MemoryChannel> {
    let client = RpcClient::with_timeout(broker.channel(), timeout);
    client.open().expect("open rpc client");
    client
}

#[test]
fn ping_echo_service() {
    init_tracing();
    let broker = MemoryBroker::new();
    let _server = serve(&broker, "svc.echo", Echo).unwrap();
    let client = open_client(&broker, WAIT);

    assert_eq!(client.call("", "svc.echo", b"ping").unwrap(), b"ping");
}

#[test]
fn payloads_round_trip_byte_for_byte() {
    let broker = MemoryBroker::new();
    let _server = serve(&broker, "svc.echo", Echo).unwrap();
    let client = open_client(&broker, WAIT);

    let every_byte: Vec<u8> = (0..=255u8).collect();
    assert_eq!(client.call("", "svc.echo", &every_byte).unwrap(), every_byte);
    assert!(client.call("", "svc.echo", b"").unwrap().is_empty());
}

#[test]
fn routes_through_a_bound_exchange() {
    let broker = MemoryBroker::new();
    let server = serve(&broker, "svc.q", Echo).unwrap();
    server.exchange_declare("rpc").unwrap();
    server.queue_bind("svc.q", "rpc", "echo").unwrap();
    let client = open_client(&broker, WAIT);

    assert_eq!(client.call("rpc", "echo", b"via exchange").unwrap(), b"via exchange");
}

#[test]
fn publish_to_unknown_exchange_fails_without_leaking() {
    let broker = MemoryBroker::new();
    let client = open_client(&broker, WAIT);

    let err = client.call("missing", "echo", b"x").unwrap_err();
    assert!(matches!(err, RpcError::Transport(_)));
    assert_eq!(client.pending_calls(), 0);
}

#[test]
fn concurrent_callers_never_see_each_others_replies() {
    const CALLERS: usize = 16;
    let broker = MemoryBroker::new();
    let _server = batcher(&broker, "svc.batch", CALLERS, |held| {
        held.shuffle(&mut rand::thread_rng())
    })
    .unwrap();
    let client = Arc::new(open_client(&broker, WAIT));

    let callers: Vec<_> = (0..CALLERS)
        .map(|n| {
            let client = Arc::clone(&client);
            thread::spawn(move || {
                let body = format!("request-{n}").into_bytes();
                (body.clone(), client.call("", "svc.batch", &body))
            })
        })
        .collect();

    for caller in callers {
        let (sent, received) = caller.join().unwrap();
        assert_eq!(received.unwrap(), sent);
    }
    assert_eq!(client.pending_calls(), 0);
}

#[test]
fn reversed_replies_reach_the_right_callers() {
    let broker = MemoryBroker::new();
    let _server = batcher(&broker, "svc.rev", 2, |held| held.reverse()).unwrap();
    let client = Arc::new(open_client(&broker, WAIT));

    let first = {
        let client = Arc::clone(&client);
        thread::spawn(move || client.call("", "svc.rev", b"A"))
    };
    while client.pending_calls() == 0 {
        thread::yield_now();
    }
    let second = client.call("", "svc.rev", b"B").unwrap();

    assert_eq!(second, b"B");
    assert_eq!(first.join().unwrap().unwrap(), b"A");
}

#[test]
fn call_without_consumer_times_out_and_releases_its_slot() {
    let broker = MemoryBroker::new();
    let client = RpcClient::with_timeout_millis(broker.channel(), 50).unwrap();
    client.open().unwrap();

    let started = Instant::now();
    let err = client.call("", "no.such.queue", b"hello").unwrap_err();

    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(err.is_timeout());
    assert_eq!(client.pending_calls(), 0);
}

#[test]
fn late_reply_is_dropped_and_later_calls_are_unaffected() {
    let broker = MemoryBroker::new();
    let (server, requests) = sink(&broker, "svc.slow").unwrap();
    let _echo = serve(&broker, "svc.echo", Echo).unwrap();
    let client = open_client(&broker, Duration::from_millis(200));

    assert!(client.call("", "svc.slow", b"first").unwrap_err().is_timeout());

    let stale = requests.recv_timeout(WAIT).unwrap();
    reply(&server, &stale.properties, BasicProperties::new(), b"stale").unwrap();

    assert_eq!(client.call("", "svc.echo", b"second").unwrap(), b"second");
    assert_eq!(client.pending_calls(), 0);
}

#[test]
fn unknown_correlation_id_is_harmless() {
    let broker = MemoryBroker::new();
    let _server = serve(&broker, "svc.echo", Echo).unwrap();
    let client = open_client(&broker, WAIT);
    let reply_queue = client.reply_queue().unwrap();

    let stranger = broker.channel();
    stranger
        .basic_publish(
            "",
            &reply_queue,
            &BasicProperties::new().with_correlation_id("999"),
            b"nobody asked",
        )
        .unwrap();

    assert_eq!(client.call("", "svc.echo", b"still fine").unwrap(), b"still fine");
}

struct Accounts;

impl RpcHandler<Vec<u8>, Vec<u8>> for Accounts {
    fn handle_call_parm(&self, parm: Vec<u8>) -> HandlerResult<Vec<u8>> {
        match parm.as_slice() {
            b"balance" => Ok(b"0".to_vec()),
            b"withdraw" => Err(HandlerError::Failed("insufficient funds".into())),
            _ => Err(HandlerError::Unsupported("call")),
        }
    }
}

#[test]
fn service_exception_carries_its_payload() {
    let broker = MemoryBroker::new();
    let _server = serve(&broker, "accounts", Accounts).unwrap();
    let client = open_client(&broker, WAIT);

    assert_eq!(client.call("", "accounts", b"balance").unwrap(), b"0");
    match client.call("", "accounts", b"withdraw") {
        Err(RpcError::RemoteService { payload }) => assert_eq!(payload, b"insufficient funds"),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn unsupported_request_is_a_remote_call_error() {
    let broker = MemoryBroker::new();
    let _server = serve(&broker, "accounts", Accounts).unwrap();
    let client = open_client(&broker, WAIT);

    let err = client.call("", "accounts", b"transfer").unwrap_err();
    assert!(matches!(err, RpcError::RemoteCall { .. }));
    assert_eq!(err.remote_payload(), Some(&b"no handler implemented for call"[..]));
}

#[test]
fn caller_properties_survive_except_correlation_and_reply_to() {
    let broker = MemoryBroker::new();
    let (_server, requests) = sink(&broker, "svc.sink").unwrap();
    let client = open_client(&broker, Duration::from_millis(10));

    let props = BasicProperties::new()
        .with_content_type("application/json")
        .with_header("tenant", "acme")
        .with_correlation_id("caller-chosen")
        .with_reply_to("caller-queue");
    let _ = client.call_with_properties("", "svc.sink", &props, b"{}");

    let seen = requests.recv_timeout(WAIT).unwrap();
    assert_eq!(seen.properties.content_type(), Some("application/json"));
    assert_eq!(seen.properties.header("tenant"), Some("acme"));
    assert_eq!(seen.properties.correlation_id(), Some("1"));
    assert_eq!(
        seen.properties.reply_to(),
        client.reply_queue().as_deref()
    );
    assert_eq!(seen.body, b"{}");
    assert_eq!(props.correlation_id(), Some("caller-chosen"));
}

#[test]
fn lifecycle_gates_calls() {
    let broker = MemoryBroker::new();
    let _server = serve(&broker, "svc.echo", Echo).unwrap();
    let client = RpcClient::new(broker.channel());

    assert_eq!(client.reply_queue(), None);
    assert!(matches!(client.call("", "svc.echo", b"x"), Err(RpcError::NotOpen)));

    client.open().unwrap();
    assert!(matches!(client.open(), Err(RpcError::AlreadyOpen)));
    assert_eq!(client.call("", "svc.echo", b"x").unwrap(), b"x");

    client.close().unwrap();
    client.close().unwrap();
    assert!(matches!(client.call("", "svc.echo", b"x"), Err(RpcError::NotOpen)));
    assert!(matches!(client.open(), Err(RpcError::Closed)));
}

#[test]
fn reply_queue_is_exclusive_to_the_client_channel() {
    let broker = MemoryBroker::new();
    let client = open_client(&broker, WAIT);
    let reply_queue = client.reply_queue().unwrap();
    assert!(broker.has_queue(&reply_queue));

    let intruder = broker.channel();
    let server = HandlerServer::new(intruder.clone(), Echo);
    assert!(matches!(
        intruder.basic_consume(&reply_queue, true, Arc::new(server)),
        Err(TransportError::AccessRefused(_))
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn correlation_ids_are_sequential_and_unique(calls in 1usize..24) {
        let broker = MemoryBroker::new();
        let (_server, requests) = sink(&broker, "svc.ids").unwrap();
        let client = open_client(&broker, Duration::ZERO);

        for _ in 0..calls {
            let _ = client.call("", "svc.ids", b"");
        }

        let mut seen = HashSet::new();
        for expected in 1..=calls {
            let request = requests.recv_timeout(WAIT).unwrap();
            let id = request.properties.correlation_id().unwrap().to_string();
            prop_assert_eq!(id.clone(), expected.to_string());
            prop_assert!(seen.insert(id));
        }
    }
}

#[test]
#[ignore]
fn slow_many_threads_many_calls() {
    const THREADS: usize = 8;
    const CALLS: usize = 2_000;
    let broker = MemoryBroker::new();
    let _server = serve(&broker, "svc.echo", Echo).unwrap();
    let client = Arc::new(open_client(&broker, WAIT));

    let workers: Vec<_> = (0..THREADS)
        .map(|t| {
            let client = Arc::clone(&client);
            thread::spawn(move || {
                for n in 0..CALLS {
                    let body = format!("{t}:{n}").into_bytes();
                    assert_eq!(client.call("", "svc.echo", &body).unwrap(), body);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(client.pending_calls(), 0);
}
