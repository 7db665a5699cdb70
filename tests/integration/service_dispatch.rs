//! Requests decoded from wire JSON and applied through the service handler

use dungeon_finder::amqp::{MessageHandler, MessageUtils};
use dungeon_finder::config::LfgConfig;
use dungeon_finder::metrics::MetricsCollector;
use dungeon_finder::notify::{Notification, OutboundNotification};
use dungeon_finder::service::{
    build_engine, run_tick, ProductionMessageHandler, RequestDispatcher,
};
use dungeon_finder::types::{EntityRef, LfgState, ProposalId};
use dungeon_finder::world::World;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::RwLock;

struct Service {
    handler: Arc<ProductionMessageHandler>,
    manager: Arc<RwLock<dungeon_finder::LfgManager>>,
    world: Arc<dungeon_finder::InMemoryWorld>,
    metrics: Arc<MetricsCollector>,
    notifications: UnboundedReceiver<OutboundNotification>,
}

fn create_service() -> Service {
    let config = LfgConfig {
        rng_seed: Some(5),
        ..LfgConfig::default()
    };
    let engine = build_engine(&config).unwrap();
    let manager = Arc::new(RwLock::new(engine.manager));
    let metrics = Arc::new(MetricsCollector::new().unwrap());
    let handler = Arc::new(ProductionMessageHandler::new(
        manager.clone(),
        RequestDispatcher::new(engine.world.clone()),
        metrics.clone(),
    ));
    Service {
        handler,
        manager,
        world: engine.world,
        metrics,
        notifications: engine.notifications,
    }
}

async fn send_json(service: &Service, json: &str) -> dungeon_finder::Result<()> {
    send_to(&service.handler, json).await
}

async fn send_to(handler: &ProductionMessageHandler, json: &str) -> dungeon_finder::Result<()> {
    let request = MessageUtils::deserialize_request(json.as_bytes())?;
    handler.handle_request(request).await
}

fn drain(rx: &mut UnboundedReceiver<OutboundNotification>) -> Vec<OutboundNotification> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n);
    }
    out
}

async fn register_and_queue(service: &Service) {
    let party = [(11, 3), (12, 4), (13, 8), (14, 8), (15, 8)];
    for (id, _) in party {
        let json = format!(
            r#"{{"type":"player_profile","profile":{{"id":{},"name":"hero{}","level":80,"team":"Alliance"}}}}"#,
            id, id
        );
        send_json(service, &json).await.unwrap();
    }
    for (id, mask) in party {
        let json = format!(
            r#"{{"type":"join_lfg","player_id":{},"roles":{},"dungeons":[202]}}"#,
            id, mask
        );
        send_json(service, &json).await.unwrap();
    }
}

#[tokio::test]
async fn test_json_requests_form_a_group() {
    let mut service = create_service();
    register_and_queue(&service).await;
    assert_eq!(service.manager.read().await.stats().queued_players, 5);

    let report = run_tick(&service.manager, &service.metrics, Duration::from_secs(1)).await;
    assert_eq!(report.new_proposals, 1);

    let proposal_id: ProposalId = drain(&mut service.notifications)
        .into_iter()
        .find_map(|n| match n.notification {
            Notification::ProposalUpdate { proposal_id, .. } => Some(proposal_id),
            _ => None,
        })
        .unwrap();

    for id in 11..=15 {
        let json = format!(
            r#"{{"type":"update_proposal","proposal_id":{},"player_id":{},"accept":true}}"#,
            proposal_id, id
        );
        send_json(&service, &json).await.unwrap();
    }

    let group = service.world.group_of(11).unwrap();
    let manager = service.manager.read().await;
    assert!(manager.is_lfg_group(group));
    assert_eq!(manager.get_state(EntityRef::Group(group)), LfgState::Dungeon);
    assert_eq!(manager.stats().groups_formed, 1);
}

#[tokio::test]
async fn test_kick_event_from_world_opens_vote() {
    let mut service = create_service();
    register_and_queue(&service).await;
    run_tick(&service.manager, &service.metrics, Duration::from_secs(1)).await;
    let proposal_id = service.manager.read().await.proposal_of(11).unwrap().id;
    for id in 11..=15 {
        service
            .manager
            .write()
            .await
            .update_proposal(proposal_id, id, true);
    }
    let group = service.world.group_of(11).unwrap();
    let leader = service.manager.read().await.get_leader(group).unwrap();
    let victim = (11..=15).find(|p| *p != leader).unwrap();
    drain(&mut service.notifications);

    let json = format!(
        r#"{{"type":"group_event","event":{{"event":"member_removed","group_id":{},"player_id":{},"method":"Kick","kicker":{},"reason":"afk"}}}}"#,
        group, victim, leader
    );
    send_json(&service, &json).await.unwrap();

    // the world keeps the member until the vote passes
    assert_eq!(service.world.group_of(victim), Some(group));
    assert!(service.manager.read().await.boot(group).is_some());
    let votes: Vec<_> = drain(&mut service.notifications)
        .into_iter()
        .filter(|n| matches!(n.notification, Notification::BootProposalUpdate { .. }))
        .collect();
    assert_eq!(votes.len(), 5);
}

#[tokio::test]
async fn test_unknown_proposal_is_an_error() {
    let service = create_service();
    let result = send_json(
        &service,
        r#"{"type":"update_proposal","proposal_id":99,"player_id":1,"accept":true}"#,
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_malformed_requests_are_rejected_before_dispatch() {
    let service = create_service();

    assert!(send_json(&service, r#"{"type":"join_lfg","player_id":1}"#)
        .await
        .is_err());
    assert!(send_json(
        &service,
        r#"{"type":"join_lfg","player_id":0,"roles":2,"dungeons":[202]}"#
    )
    .await
    .is_err());
    assert!(send_json(
        &service,
        r#"{"type":"initiate_boot","group_id":1,"initiator":4,"victim":4}"#
    )
    .await
    .is_err());
    assert_eq!(service.manager.read().await.stats().joins_requested, 0);
}

#[tokio::test]
async fn test_member_added_event_registers_external_group() {
    let service = create_service();
    register_and_queue(&service).await;

    // player 12 joins an externally created group while queued solo
    send_json(
        &service,
        r#"{"type":"group_event","event":{"event":"member_added","group_id":500,"player_id":11}}"#,
    )
    .await
    .unwrap();
    send_json(
        &service,
        r#"{"type":"group_event","event":{"event":"member_added","group_id":500,"player_id":12}}"#,
    )
    .await
    .unwrap();

    assert_eq!(service.world.group_of(12), Some(500));
    let manager = service.manager.read().await;
    assert_eq!(manager.get_group(12), Some(500));
    assert_eq!(manager.get_state(EntityRef::Player(12)), LfgState::None);
}

#[tokio::test]
async fn test_concurrent_joins_are_serialized() {
    let service = create_service();

    let handles: Vec<_> = (100..140u64)
        .map(|id| {
            let handler = service.handler.clone();
            tokio::spawn(async move {
                let profile = format!(
                    r#"{{"type":"player_profile","profile":{{"id":{},"name":"horde{}","level":80,"team":"Horde"}}}}"#,
                    id, id
                );
                send_to(&handler, &profile).await?;
                let join = format!(
                    r#"{{"type":"join_lfg","player_id":{},"roles":8,"dungeons":[202,225]}}"#,
                    id
                );
                send_to(&handler, &join).await
            })
        })
        .collect();

    let results = futures::future::join_all(handles).await;
    assert!(results.into_iter().all(|r| matches!(r, Ok(Ok(())))));

    let stats = service.manager.read().await.stats();
    assert_eq!(stats.joins_requested, 40);
    assert_eq!(stats.queued_players, 40);
    assert_eq!(service.world.player_count(), 40);
}
