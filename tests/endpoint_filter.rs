#[path = "common.rs"]
mod common;

use std::time::Duration;

use tokio::time::timeout;

use fanout::core::codec;
use fanout::core::subscriber::Subscriber;
use fanout::transport::{PubEndpoint, SubEndpoint};
use fanout::Error;

use common::{bind_publisher, publisher_config, subscriber_config, GUARD};

const SHORT: Duration = Duration::from_millis(200);

#[tokio::test]
async fn prefix_filter_is_only_a_hint() {
    common::init_logging();
    let (publisher, address) =
        bind_publisher(publisher_config("inproc://advisory", &["A", "AB"], 1)).await;
    let mut subscriber = Subscriber::connect(subscriber_config("S", &address, &["A"]))
        .await
        .unwrap();
    publisher.endpoint().wait_for_peers(1, GUARD).await.unwrap();

    publisher.publish("AB", "not for S").unwrap();
    publisher.publish("A", "for S").unwrap();

    let message = timeout(GUARD, subscriber.next_message())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.topic, "A");
    assert_eq!(message.payload_lossy(), "for S");

    let report = subscriber.report();
    assert_eq!(report.received, 1);
    assert_eq!(report.dropped, 1);
}

#[tokio::test]
async fn endpoint_without_filter_delivers_nothing() {
    common::init_logging();
    let publisher = PubEndpoint::listen("inproc://no-filter").await.unwrap();
    let mut endpoint = SubEndpoint::dial("inproc://no-filter").await.unwrap();
    publisher.wait_for_peers(1, GUARD).await.unwrap();

    publisher.send(&codec::encode("A", "hello").unwrap()).unwrap();
    assert!(matches!(
        endpoint.receive_with_timeout(SHORT).await,
        Err(Error::Timeout(_))
    ));

    // Filtered frames are consumed; only later ones reach the new filter.
    endpoint.set_receive_filter("A");
    publisher.send(&codec::encode("A", "again").unwrap()).unwrap();
    let raw = endpoint.receive_with_timeout(GUARD).await.unwrap();
    assert_eq!(&raw[..], b"A|again");
}

#[tokio::test]
async fn empty_filter_delivers_everything() {
    common::init_logging();
    let publisher = PubEndpoint::listen("inproc://empty-filter").await.unwrap();
    let mut endpoint = SubEndpoint::dial("inproc://empty-filter").await.unwrap();
    endpoint.set_receive_filter("");
    publisher.wait_for_peers(1, GUARD).await.unwrap();

    let outcome = publisher.send(b"X|1").unwrap();
    assert_eq!(outcome.delivered, 1);
    publisher.send(b"Y|2").unwrap();

    assert_eq!(&endpoint.receive_with_timeout(GUARD).await.unwrap()[..], b"X|1");
    assert_eq!(&endpoint.receive_with_timeout(GUARD).await.unwrap()[..], b"Y|2");
}

#[tokio::test]
async fn malformed_message_is_reported_by_the_subscriber() {
    common::init_logging();
    let publisher = PubEndpoint::listen("inproc://malformed").await.unwrap();
    let mut subscriber = Subscriber::connect(subscriber_config("S", "inproc://malformed", &["A"]))
        .await
        .unwrap();
    publisher.wait_for_peers(1, GUARD).await.unwrap();

    // Passes the "A" prefix hint but has no separator.
    publisher.send(b"A-without-separator").unwrap();
    assert!(matches!(
        subscriber.next_message().await,
        Err(Error::MalformedMessage(_))
    ));
}

#[tokio::test]
async fn peers_are_counted_and_released() {
    common::init_logging();
    let publisher = PubEndpoint::listen("inproc://peer-count").await.unwrap();
    let mut first = SubEndpoint::dial("inproc://peer-count").await.unwrap();
    let _second = SubEndpoint::dial("inproc://peer-count").await.unwrap();
    assert_eq!(publisher.wait_for_peers(2, GUARD).await.unwrap(), 2);

    first.close();
    assert!(first.is_closed());
    timeout(GUARD, async {
        while publisher.peer_count() != 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn wait_for_peers_times_out() {
    common::init_logging();
    let publisher = PubEndpoint::listen("inproc://lonely").await.unwrap();
    assert!(matches!(
        publisher.wait_for_peers(1, SHORT).await,
        Err(Error::Timeout(_))
    ));
}

#[tokio::test]
async fn closed_endpoints_refuse_to_send() {
    common::init_logging();
    let publisher = PubEndpoint::listen("inproc://closed-send").await.unwrap();
    let mut endpoint = SubEndpoint::dial("inproc://closed-send").await.unwrap();

    publisher.close();
    publisher.close();
    assert!(publisher.is_closed());
    assert!(matches!(publisher.send(b"A|x"), Err(Error::Send { .. })));

    endpoint.close();
    assert!(matches!(endpoint.send(b"A|x").await, Err(Error::Send { .. })));
}
