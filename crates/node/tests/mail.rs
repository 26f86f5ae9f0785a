//! Mailbox operations end to end: accounts, delivery, deletion, recovery.

mod common;

use mailring_core::mail::Mailbox;
use mailring_core::mail::Message;
use mailring_core::proto::Credentials;
use mailring_core::proto::StatusCode;
use mailring_node::rpc;
use mailring_node::Client;
use mailring_node::Node;

use common::spawn_ring;

fn code_of(error: mailring_node::Error) -> StatusCode {
    error.fault().expect("wire fault").code
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn register_then_login_resolves_to_the_same_node() {
    let mut fixture = spawn_ring(&[64001, 64002, 64003]).await;
    let entry = fixture.ring.entry_node().info().clone();

    for i in 0..10 {
        let user = format!("user{i}@test.com");
        let password = format!("pw{i}");

        let mut registrar = Client::connect_peer(&entry).await.unwrap();
        let registered = registrar.account_register(&user, &password).await.unwrap();

        let mut visitor = Client::connect_peer(&entry).await.unwrap();
        let resolved = visitor.account_login(&user, &password).await.unwrap();
        assert_eq!(registered.id, resolved.id, "round trip for {user}");
    }

    let mut stranger = Client::connect_peer(&entry).await.unwrap();
    let missing = stranger
        .account_login("non_existing@test.com", "non_existing")
        .await
        .unwrap_err();
    assert_eq!(code_of(missing), StatusCode::NotFound);

    fixture.ring.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn second_registration_already_exists() {
    let mut fixture = spawn_ring(&[65101]).await;
    let entry = fixture.ring.entry_node().info().clone();

    let mut first = Client::connect_peer(&entry).await.unwrap();
    first.account_register("user5@test.com", "pw").await.unwrap();

    let mut second = Client::connect_peer(&entry).await.unwrap();
    let dup = second
        .account_register("user5@test.com", "other")
        .await
        .unwrap_err();
    assert_eq!(code_of(dup), StatusCode::AlreadyExists);

    fixture.ring.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sent_messages_arrive_in_order() {
    let mut fixture = spawn_ring(&[65001, 65002, 65003]).await;
    let entry = fixture.ring.entry_node().info().clone();

    let mut receiver = Client::connect_peer(&entry).await.unwrap();
    receiver
        .account_register("get@test.com", "test_psw")
        .await
        .unwrap();
    let mut sender = Client::connect_peer(&entry).await.unwrap();
    sender
        .account_register("snd@test.com", "test_psw")
        .await
        .unwrap();

    let mut sent = Vec::new();
    for i in 0..10 {
        let msg = Message::new("get@test.com", "snd@test.com", format!("m{i}"), "body");
        sender.send(msg.clone()).await.unwrap();
        sent.push(msg);
    }

    let inbox = receiver.get_messages().await.unwrap();
    assert_eq!(inbox.len(), 10);
    for (got, expected) in inbox.iter().zip(&sent) {
        assert!(got.same_as(expected));
    }

    fixture.ring.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn send_rejects_a_forged_sender() {
    let mut fixture = spawn_ring(&[65111]).await;
    let entry = fixture.ring.entry_node().info().clone();

    let mut receiver = Client::connect_peer(&entry).await.unwrap();
    receiver
        .account_register("get@test.com", "test_psw")
        .await
        .unwrap();
    let mut sender = Client::connect_peer(&entry).await.unwrap();
    sender
        .account_register("snd@test.com", "test_psw")
        .await
        .unwrap();

    // The message claims another From than the authenticated account.
    let forged = Message::new("get@test.com", "someone_else@test.com", "hi", "");
    let refused = sender.send(forged).await.unwrap_err();
    assert_eq!(code_of(refused), StatusCode::Unauthenticated);

    fixture.ring.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn receive_with_a_wrong_password_is_unauthenticated() {
    let mut fixture = spawn_ring(&[65121]).await;
    let entry = fixture.ring.entry_node().info().clone();

    let mut client = Client::connect_peer(&entry).await.unwrap();
    let owner = client
        .account_register("get@test.com", "test_psw")
        .await
        .unwrap();

    let wrong = Credentials {
        user: "get@test.com".to_string(),
        password: Mailbox::hash_password("wrong_psw"),
    };
    let refused = rpc::receive(&owner.conn_string(), &wrong).await.unwrap_err();
    assert_eq!(code_of(refused), StatusCode::Unauthenticated);

    let right = Credentials {
        user: "get@test.com".to_string(),
        password: Mailbox::hash_password("test_psw"),
    };
    assert!(rpc::receive(&owner.conn_string(), &right).await.is_ok());

    fixture.ring.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn delete_shifts_later_messages_left() {
    let mut fixture = spawn_ring(&[65131]).await;
    let entry = fixture.ring.entry_node().info().clone();

    let mut receiver = Client::connect_peer(&entry).await.unwrap();
    receiver.account_register("user3@test.com", "pw").await.unwrap();
    let mut sender = Client::connect_peer(&entry).await.unwrap();
    sender.account_register("user4@test.com", "pw").await.unwrap();

    for i in 0..4 {
        let msg = Message::new("user3@test.com", "user4@test.com", format!("s{i}"), "");
        sender.send(msg).await.unwrap();
    }

    receiver.remove(1).await.unwrap();
    let inbox = receiver.get_messages().await.unwrap();
    let subjects: Vec<_> = inbox.iter().map(|m| m.subject.as_str()).collect();
    assert_eq!(subjects, ["s0", "s2", "s3"]);

    let out = receiver.remove(10).await.unwrap_err();
    assert_eq!(code_of(out), StatusCode::OutOfRange);

    fixture.ring.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dump_file_survives_a_failed_evacuation() {
    let mut fixture = spawn_ring(&[65141]).await;
    let node = fixture.ring.entry_node().clone();
    let node_config = fixture.node_config();

    let mut client = Client::connect_peer(node.info()).await.unwrap();
    client.account_register("alice@ring.local", "pw").await.unwrap();

    // A lone node can only evacuate to itself, which refuses transfers once
    // shutdown began, so the mailbox must land in the dump file.
    let dump = node.dump_path();
    node.stop().await;
    assert!(dump.exists());

    // A restart on the same port reads the dump back before re-entering the
    // ring.
    let revived = Node::start_with_config("127.0.0.1", 65141, node_config)
        .await
        .unwrap();
    assert_eq!(revived.mailbox_count().unwrap(), 1);

    let mut returning = Client::connect_peer(revived.info()).await.unwrap();
    let resolved = returning.account_login("alice@ring.local", "pw").await.unwrap();
    assert_eq!(resolved.id, revived.info().id);

    revived.stop().await;
    fixture.ring.shutdown().await;
}
