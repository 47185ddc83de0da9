use std::time::Duration;

use marketchat::{
    db,
    model::{Identity, LinkedRecord, MessageId, MessageKey, Profile, Role, SendRequest, UserId},
    server, AppError, ChatApi, ChatConfig, HttpChatApi, Messenger,
};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use tokio::net::TcpListener;

struct TestServer {
    base_url: String,
    http: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        let db_pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        db::migrate(&db_pool).await.unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, server::app(db_pool)).await.unwrap();
        });

        let server = Self { base_url: format!("http://{addr}"), http: reqwest::Client::new() };
        server.profile("buyer", "Dana", Role::Buyer).await;
        server.profile("vendor", "Bike Shop", Role::Vendor).await;
        server.profile("company", "Acme Freight", Role::Company).await;
        server
    }

    async fn profile(&self, id: &str, name: &str, role: Role) {
        let profile = Profile { id: UserId::new(id), name: name.to_owned(), role, avatar_url: None };
        let response = self.http
            .post(format!("{}/profiles", self.base_url))
            .json(&profile)
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
    }

    fn config(&self) -> ChatConfig {
        ChatConfig {
            api_base_url: self.base_url.clone(),
            poll_interval: Duration::from_secs(600),
            request_timeout: Duration::from_secs(5),
        }
    }

    fn api(&self) -> HttpChatApi {
        HttpChatApi::new(&self.config()).unwrap()
    }
}

fn request(from: &str, to: &str, content: &str) -> SendRequest {
    SendRequest {
        sender_id: UserId::new(from),
        receiver_id: UserId::new(to),
        content: content.to_owned(),
        reply_to_id: None,
        attachment_url: None,
        linked_record_ref: None,
    }
}

#[tokio::test]
async fn unread_counts_follow_reads() {
    let server = TestServer::start().await;
    let api = server.api();
    let buyer = UserId::new("buyer");
    let vendor = UserId::new("vendor");

    let mut first = request("buyer", "vendor", "is the bike still for sale?");
    first.linked_record_ref = Some(LinkedRecord { kind: "product".to_owned(), id: "bike-42".to_owned() });
    api.send_message(&first).await.unwrap();
    api.send_message(&request("vendor", "buyer", "yes it is")).await.unwrap();
    api.send_message(&request("vendor", "buyer", "want to see it?")).await.unwrap();
    api.send_message(&request("company", "buyer", "quote attached")).await.unwrap();

    let conversations = api.list_conversations(&buyer).await.unwrap();
    assert_eq!(conversations.len(), 2);
    let bikes = conversations.iter().find(|c| c.counterparty_id == vendor).unwrap();
    assert_eq!(bikes.unread_count, 2);
    assert_eq!(bikes.counterparty_profile.name, "Bike Shop");
    assert_eq!(bikes.linked_record_ref.as_ref().map(|r| r.id.as_str()), Some("bike-42"));
    let preview = bikes.last_message_preview.as_ref().unwrap();
    assert_eq!(preview.content, "want to see it?");
    assert!(!preview.is_from_self);

    let snapshot = api.fetch_messages(&buyer, &vendor).await.unwrap();
    let contents: Vec<_> = snapshot.iter().map(|m| m.data.content.as_str()).collect();
    assert_eq!(contents, vec!["is the bike still for sale?", "yes it is", "want to see it?"]);

    let conversations = api.list_conversations(&buyer).await.unwrap();
    let unread: u32 = conversations.iter().map(|c| c.unread_count).sum();
    assert_eq!(unread, 1);

    let vendor_side = api.list_conversations(&vendor).await.unwrap();
    assert_eq!(vendor_side.len(), 1);
    assert_eq!(vendor_side[0].unread_count, 1);
    assert!(vendor_side[0].last_message_preview.as_ref().unwrap().is_from_self);
}

#[tokio::test]
async fn replies_and_reactions_round_trip() {
    let server = TestServer::start().await;
    let api = server.api();

    let question = api.send_message(&request("buyer", "vendor", "is the bike still for sale?")).await.unwrap();
    let mut answer = request("vendor", "buyer", "yes it is");
    answer.reply_to_id = Some(question.id.clone());
    let answer = api.send_message(&answer).await.unwrap();

    let reply = answer.data.reply_to.as_ref().unwrap();
    assert_eq!(reply.id, question.id);
    assert_eq!(reply.author, "Dana");
    assert_eq!(reply.snippet, "is the bike still for sale?");

    assert_eq!(api.add_reaction(&answer.id, "👍").await.unwrap(), vec!["👍"]);
    assert_eq!(api.add_reaction(&answer.id, "👍").await.unwrap(), vec!["👍", "👍"]);
    assert_eq!(api.add_reaction(&answer.id, "❤️").await.unwrap(), vec!["👍", "👍", "❤️"]);

    let snapshot = api.fetch_messages(&UserId::new("buyer"), &UserId::new("vendor")).await.unwrap();
    assert_eq!(snapshot[1].data.reactions, vec!["👍", "👍", "❤️"]);
    assert!(snapshot[0].data.reactions.is_empty());
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let server = TestServer::start().await;
    let api = server.api();

    let err = api.send_message(&request("buyer", "vendor", "   ")).await.unwrap_err();
    assert!(matches!(err, AppError::Rejected(_)), "{err}");

    let elsewhere = api.send_message(&request("company", "buyer", "quote attached")).await.unwrap();
    let mut reply = request("buyer", "vendor", "about that quote");
    reply.reply_to_id = Some(elsewhere.id);
    assert!(matches!(api.send_message(&reply).await.unwrap_err(), AppError::Rejected(_)));

    let err = api.add_reaction(&MessageId::new("missing"), "👍").await.unwrap_err();
    assert!(matches!(err, AppError::Rejected(ref reason) if reason.contains("missing")), "{err}");

    let listings: [&[(&str, &str)]; 3] = [
        &[("userId", "buyer")],
        &[("userId", "buyer"), ("conversationList", "false")],
        &[("userId", "buyer"), ("conversationList", "yes")],
    ];
    for query in listings {
        let response = server.http
            .get(format!("{}/conversations", server.base_url))
            .query(query)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST, "{query:?}");
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["success"], json!(false));
        assert!(body["error"].as_str().unwrap().contains("conversationList"));
    }
}

#[tokio::test]
async fn messengers_talk_through_the_server() {
    let server = TestServer::start().await;
    let buyer = Messenger::connect(Identity::new("buyer"), server.config()).unwrap();
    let vendor = Messenger::connect(Identity::new("vendor"), server.config()).unwrap();

    let bike_shop = Profile {
        id: UserId::new("vendor"),
        name: "Bike Shop".to_owned(),
        role: Role::Vendor,
        avatar_url: None,
    };
    buyer.start_conversation(bike_shop).await.unwrap();
    let question = buyer.send("is the bike still for sale?").await.unwrap();

    vendor.refresh_conversations().await.unwrap();
    assert_eq!(vendor.total_unread(), 1);
    assert_eq!(vendor.conversations()[0].counterparty_profile.name, "Dana");

    vendor.select_conversation(&UserId::new("buyer")).await.unwrap();
    assert_eq!(vendor.total_unread(), 0);
    let reply = vendor.set_reply_target(&MessageKey::Confirmed(question.clone())).unwrap();
    assert_eq!(reply.author, "Dana");
    vendor.send("yes it is").await.unwrap();
    vendor.add_reaction(&MessageKey::Confirmed(question.clone()), "👍").await.unwrap();

    buyer.reload_active().await.unwrap();
    let log = buyer.active_messages();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].data().reactions, vec!["👍"]);
    assert_eq!(log[1].data().reply_to.as_ref().map(|r| &r.id), Some(&question));
    assert!(log.iter().all(|m| !m.is_provisional()));

    vendor.refresh_conversations().await.unwrap();
    assert_eq!(vendor.total_unread(), 0);

    buyer.shutdown();
    vendor.shutdown();
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ChatConfig {
        api_base_url: format!("http://{addr}"),
        poll_interval: Duration::from_secs(600),
        request_timeout: Duration::from_secs(2),
    };
    let api = HttpChatApi::new(&config).unwrap();
    let err = api.list_conversations(&UserId::new("buyer")).await.unwrap_err();
    assert!(matches!(err, AppError::Network(_)), "{err}");
    assert!(err.is_soft_failure());
}
