//! The live-update bridge.
//!
//! Connects the orchestrator to a development server: loads the
//! initial tile set from the feed, then listens for change
//! notifications and drives debounced teardown-then-reload cycles.
//!
//! # Architecture
//!
//! ```text
//! WebSocket messages (tokio-tungstenite)
//!   → parse change / hard-refresh
//!   → debounce 150ms per tile name (newer supersedes pending)
//!   → freeze route refreshes
//!   → teardown old instance → load replacement
//!   → release freeze (one RoutesRefreshed per settled cycle)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use mosaic_core::{TileDescriptor, TileName};
use mosaic_events::{EventBus, MosaicEvent};
use mosaic_loader::Orchestrator;

use crate::config::DebugConfig;
use crate::connection::{DebugConnection, DebugMessage};
use crate::error::{DebugError, DebugResult};
use crate::feed::{FeedClient, FeedSource};

/// Source of inbound debug messages.
///
/// [`DebugConnection`] is the production implementation; tests drive
/// the bridge with scripted sources instead of a live socket.
#[async_trait]
pub trait MessageSource: Send {
    /// Receive the next message; `Ok(None)` means the source ended.
    async fn recv(&mut self) -> DebugResult<Option<DebugMessage>>;
}

#[async_trait]
impl MessageSource for DebugConnection {
    async fn recv(&mut self) -> DebugResult<Option<DebugMessage>> {
        DebugConnection::recv(self).await
    }
}

/// Bridges a development server to the orchestrator.
pub struct DebugBridge {
    config: DebugConfig,
    orchestrator: Arc<Orchestrator>,
    feed: Arc<dyn FeedSource>,
    events: EventBus,
}

impl DebugBridge {
    #[must_use]
    pub fn new(config: DebugConfig, orchestrator: Arc<Orchestrator>) -> Self {
        let feed = Arc::new(FeedClient::new(config.feed_url.clone()));
        Self::with_feed(config, orchestrator, feed)
    }

    /// Create a bridge over an explicit feed source.
    #[must_use]
    pub fn with_feed(
        config: DebugConfig,
        orchestrator: Arc<Orchestrator>,
        feed: Arc<dyn FeedSource>,
    ) -> Self {
        let events = orchestrator.events().clone();
        Self {
            config,
            orchestrator,
            feed,
            events,
        }
    }

    /// Load the initial tile set and process change notifications
    /// until the channel ends.
    ///
    /// # Errors
    ///
    /// Returns an error when the initial feed request, the WebSocket
    /// connect, or the channel itself fails.
    pub async fn run(&self) -> DebugResult<()> {
        if self.config.load_enabled() {
            let descriptors = self.feed.fetch_initial().await?;
            self.orchestrator.load_all(descriptors).await;
        } else {
            info!("Initial tile load disabled for this session");
        }

        let mut connection = DebugConnection::connect(&self.config.ws_url).await?;
        self.pump(&mut connection).await
    }

    /// The bridge's message loop, generic over the source.
    ///
    /// Notifications for the same tile inside the debounce window
    /// coalesce: a newer one supersedes the pending one (deadline and
    /// payload both reset), so a settled burst yields one reload with
    /// the latest payload.
    pub async fn pump<S: MessageSource>(&self, source: &mut S) -> DebugResult<()> {
        let debounce = self.config.debounce();
        let mut pending: HashMap<TileName, (Instant, serde_json::Value)> = HashMap::new();

        loop {
            let next_deadline = pending.values().map(|(deadline, _)| *deadline).min();

            tokio::select! {
                biased;

                // Fire debounced reloads (check timeouts first).
                () = async {
                    match next_deadline {
                        Some(deadline) => tokio::time::sleep_until(deadline).await,
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    let now = Instant::now();
                    let ready: Vec<TileName> = pending
                        .iter()
                        .filter(|(_, (deadline, _))| *deadline <= now)
                        .map(|(name, _)| name.clone())
                        .collect();

                    for name in ready {
                        if let Some((_, payload)) = pending.remove(&name) {
                            self.reload_tile(name, payload).await;
                        }
                    }
                }

                message = source.recv() => {
                    match message {
                        Ok(Some(DebugMessage::Changed(change))) => {
                            self.schedule(change.name, change.payload, &mut pending, debounce);
                        },
                        Ok(Some(DebugMessage::HardRefresh)) => {
                            debug!("Hard refresh requested, dropping pending reloads");
                            pending.clear();
                            self.events.publish(MosaicEvent::FullReloadRequested);
                        },
                        Ok(None) => {
                            debug!("Debug channel ended");
                            break;
                        },
                        Err(DebugError::Protocol(e)) => {
                            warn!(error = %e, "Ignoring malformed channel message");
                        },
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        Ok(())
    }

    /// Record a change notification, resetting the tile's debounce
    /// timer and replacing any pending payload.
    fn schedule(
        &self,
        name: TileName,
        payload: serde_json::Value,
        pending: &mut HashMap<TileName, (Instant, serde_json::Value)>,
        debounce: std::time::Duration,
    ) {
        if !self.config.partial_reload {
            debug!(tile = %name, "Partial reload disabled, escalating to full reload");
            self.events.publish(MosaicEvent::FullReloadRequested);
            return;
        }

        debug!(tile = %name, "Change notification, reload scheduled");
        self.events
            .publish(MosaicEvent::ReloadScheduled { name: name.clone() });
        #[allow(clippy::arithmetic_side_effects)]
        // Instant + Duration cannot overflow in practice
        pending.insert(name, (Instant::now() + debounce, payload));
    }

    /// One reload cycle: teardown the old instance, load the new one,
    /// with route refreshes frozen across the whole cycle.
    async fn reload_tile(&self, name: TileName, payload: serde_json::Value) {
        info!(tile = %name, "Reloading tile");
        let _freeze = self.orchestrator.state().refresh_gate().freeze();

        self.orchestrator.remove(&name).await;
        match self.descriptor_for(&name, payload).await {
            Ok(descriptor) => self.orchestrator.add(descriptor).await,
            Err(e) => warn!(tile = %name, error = %e, "Reload failed to obtain a descriptor"),
        }
    }

    /// Obtain the replacement descriptor for a changed tile: from the
    /// notification payload when it carries a loadable source, else by
    /// re-fetching the feed.
    async fn descriptor_for(
        &self,
        name: &TileName,
        payload: serde_json::Value,
    ) -> DebugResult<TileDescriptor> {
        if let Ok(descriptor) = serde_json::from_value::<TileDescriptor>(payload)
            && (descriptor.link.is_some() || descriptor.content.is_some())
        {
            return Ok(descriptor);
        }

        let descriptors = self.feed.fetch_initial().await?;
        descriptors
            .into_iter()
            .find(|d| &d.name == name)
            .ok_or_else(|| DebugError::UnknownTile(name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use mosaic_core::HostKind;
    use mosaic_events::EventBus;
    use mosaic_loader::evaluator::NativeEvaluator;
    use mosaic_loader::{
        AppState, DependencyResolver, LoaderError, LoaderResult, TileFetcher, TileInstance,
        TilePayload,
    };

    use super::*;
    use crate::connection::ChangeNotification;

    struct ScriptedSource {
        rx: mpsc::UnboundedReceiver<DebugMessage>,
    }

    #[async_trait]
    impl MessageSource for ScriptedSource {
        async fn recv(&mut self) -> DebugResult<Option<DebugMessage>> {
            Ok(self.rx.recv().await)
        }
    }

    struct NoFetcher;

    #[async_trait]
    impl TileFetcher for NoFetcher {
        async fn fetch_source(
            &self,
            url: &str,
            _integrity: Option<&str>,
        ) -> LoaderResult<Arc<TilePayload>> {
            Err(LoaderError::Fetch {
                url: url.to_string(),
                message: "no network in tests".into(),
            })
        }

        async fn fetch_manifest(&self, url: &str) -> LoaderResult<Vec<TileDescriptor>> {
            Err(LoaderError::Fetch {
                url: url.to_string(),
                message: "no network in tests".into(),
            })
        }

        async fn fetch_require_manifest(&self, url: &str) -> LoaderResult<Vec<String>> {
            Err(LoaderError::Fetch {
                url: url.to_string(),
                message: "no network in tests".into(),
            })
        }
    }

    struct RecordingTile {
        meta: mosaic_core::TileMeta,
        content: String,
        log: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl TileInstance for RecordingTile {
        fn meta(&self) -> &mosaic_core::TileMeta {
            &self.meta
        }

        async fn setup(&mut self, _api: &mut mosaic_loader::TileApi) -> LoaderResult<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("setup:{}:{}", self.meta.name, self.content));
            Ok(())
        }

        async fn teardown(&mut self, _api: &mut mosaic_loader::TileApi) -> LoaderResult<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("teardown:{}", self.meta.name));
            Ok(())
        }

        fn has_teardown(&self) -> bool {
            true
        }
    }

    struct Harness {
        bridge: DebugBridge,
        orchestrator: Arc<Orchestrator>,
        log: Arc<StdMutex<Vec<String>>>,
        events: EventBus,
    }

    fn harness(tile_names: &[&str], config: DebugConfig) -> Harness {
        let events = EventBus::new();
        let fetcher: Arc<dyn TileFetcher> = Arc::new(NoFetcher);
        let resolver = Arc::new(DependencyResolver::new(
            Arc::clone(&fetcher),
            events.clone(),
        ));
        let evaluator = Arc::new(NativeEvaluator::new());
        let log = Arc::new(StdMutex::new(Vec::new()));

        for name in tile_names {
            let log = Arc::clone(&log);
            evaluator.register(
                TileName::new(*name).unwrap(),
                Arc::new(move |source, _scope| {
                    Ok(Box::new(RecordingTile {
                        meta: source.meta.clone(),
                        content: String::from_utf8_lossy(&source.payload.bytes).into_owned(),
                        log: Arc::clone(&log),
                    }) as Box<dyn TileInstance>)
                }),
            );
        }

        let state = Arc::new(AppState::new(events.clone()));
        let orchestrator = Arc::new(Orchestrator::new(
            HostKind::Interactive,
            fetcher,
            resolver,
            evaluator,
            state,
            events.clone(),
        ));
        let bridge = DebugBridge::new(config, Arc::clone(&orchestrator));
        Harness {
            bridge,
            orchestrator,
            log,
            events,
        }
    }

    fn descriptor(name: &str, content: &str) -> TileDescriptor {
        let mut d = TileDescriptor::named(TileName::new(name).unwrap());
        d.hash = Some("h".into());
        d.content = Some(content.to_string());
        d
    }

    fn change(name: &str, content: &str) -> DebugMessage {
        DebugMessage::Changed(ChangeNotification {
            name: TileName::new(name).unwrap(),
            payload: serde_json::json!({
                "name": name,
                "hash": "h",
                "content": content,
            }),
        })
    }

    fn drain(events: &mut mosaic_events::EventReceiver) -> Vec<String> {
        let mut tags = Vec::new();
        while let Some(event) = events.try_recv() {
            tags.push(event.event_type().to_string());
        }
        tags
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_notifications_yields_one_reload_with_last_payload() {
        let h = harness(&["shop"], DebugConfig::default());
        let mut events = h.events.subscribe();
        h.orchestrator.add(descriptor("shop", "rev0")).await;

        let (tx, rx) = mpsc::unbounded_channel();
        let bridge = h.bridge;
        let pump = tokio::spawn(async move {
            let mut source = ScriptedSource { rx };
            bridge.pump(&mut source).await
        });

        // Five notifications 10ms apart, all inside the 150ms window.
        for rev in 1..=5 {
            tx.send(change("shop", &format!("rev{rev}"))).unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        drop(tx);
        pump.await.unwrap().unwrap();

        let log = h.log.lock().unwrap().clone();
        assert_eq!(
            log,
            vec![
                "setup:shop:rev0".to_string(),
                "teardown:shop".to_string(),
                "setup:shop:rev5".to_string(),
            ]
        );

        let tags = drain(&mut events);
        assert_eq!(
            tags.iter().filter(|t| *t == "reload.scheduled").count(),
            5
        );
        assert_eq!(tags.iter().filter(|t| *t == "tile.removed").count(), 1);
        // Initial add plus the single coalesced reload.
        assert_eq!(tags.iter().filter(|t| *t == "tile.loaded").count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn tiles_debounce_independently() {
        let h = harness(&["shop", "cart"], DebugConfig::default());
        h.orchestrator.add(descriptor("shop", "rev0")).await;
        h.orchestrator.add(descriptor("cart", "rev0")).await;

        let (tx, rx) = mpsc::unbounded_channel();
        let bridge = h.bridge;
        let pump = tokio::spawn(async move {
            let mut source = ScriptedSource { rx };
            bridge.pump(&mut source).await
        });

        tx.send(change("shop", "rev1")).unwrap();
        tx.send(change("cart", "rev1")).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        drop(tx);
        pump.await.unwrap().unwrap();

        let log = h.log.lock().unwrap().clone();
        assert!(log.contains(&"setup:shop:rev1".to_string()));
        assert!(log.contains(&"setup:cart:rev1".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn reload_cycle_fires_exactly_one_routes_refreshed() {
        let h = harness(&["shop"], DebugConfig::default());
        h.orchestrator.add(descriptor("shop", "rev0")).await;
        let mut events = h.events.subscribe();

        let (tx, rx) = mpsc::unbounded_channel();
        let bridge = h.bridge;
        let pump = tokio::spawn(async move {
            let mut source = ScriptedSource { rx };
            bridge.pump(&mut source).await
        });

        // A registered page makes the reload's prune touch the routes
        // while the cycle is frozen.
        h.orchestrator
            .state()
            .register_page(&TileName::new("shop").unwrap(), "/shop", serde_json::json!({}));
        let _ = drain(&mut events);

        tx.send(change("shop", "rev1")).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        drop(tx);
        pump.await.unwrap().unwrap();

        let tags = drain(&mut events);
        assert_eq!(
            tags.iter().filter(|t| *t == "routes.refreshed").count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_partial_reload_escalates_to_full_reload() {
        let mut config = DebugConfig::default();
        config.partial_reload = false;
        let h = harness(&["shop"], config);
        h.orchestrator.add(descriptor("shop", "rev0")).await;
        let mut events = h.events.subscribe();

        let (tx, rx) = mpsc::unbounded_channel();
        let bridge = h.bridge;
        let pump = tokio::spawn(async move {
            let mut source = ScriptedSource { rx };
            bridge.pump(&mut source).await
        });

        tx.send(change("shop", "rev1")).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        drop(tx);
        pump.await.unwrap().unwrap();

        // No teardown, no reload; just the escalation event.
        let log = h.log.lock().unwrap().clone();
        assert_eq!(log, vec!["setup:shop:rev0".to_string()]);
        let tags = drain(&mut events);
        assert_eq!(tags.iter().filter(|t| *t == "reload.full").count(), 1);
        assert!(!tags.iter().any(|t| t == "reload.scheduled"));
    }

    #[tokio::test(start_paused = true)]
    async fn hard_refresh_drops_pending_reloads() {
        let h = harness(&["shop"], DebugConfig::default());
        h.orchestrator.add(descriptor("shop", "rev0")).await;
        let mut events = h.events.subscribe();

        let (tx, rx) = mpsc::unbounded_channel();
        let bridge = h.bridge;
        let pump = tokio::spawn(async move {
            let mut source = ScriptedSource { rx };
            bridge.pump(&mut source).await
        });

        tx.send(change("shop", "rev1")).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(DebugMessage::HardRefresh).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        drop(tx);
        pump.await.unwrap().unwrap();

        // The pending partial reload never ran.
        let log = h.log.lock().unwrap().clone();
        assert_eq!(log, vec!["setup:shop:rev0".to_string()]);
        let tags = drain(&mut events);
        assert_eq!(tags.iter().filter(|t| *t == "reload.full").count(), 1);
    }

    struct FailingFeed;

    #[async_trait]
    impl FeedSource for FailingFeed {
        async fn fetch_initial(&self) -> DebugResult<Vec<TileDescriptor>> {
            Err(DebugError::Protocol(
                serde_json::from_str::<serde_json::Value>("not a feed").unwrap_err(),
            ))
        }
    }

    #[tokio::test]
    async fn sourceless_payload_for_unknown_tile_fails_reload_without_panic() {
        let h = harness(&["shop"], DebugConfig::default());
        h.orchestrator.add(descriptor("shop", "rev0")).await;
        let bridge = DebugBridge::with_feed(
            DebugConfig::default(),
            Arc::clone(&h.orchestrator),
            Arc::new(FailingFeed),
        );

        // Payload has a name but nothing loadable, and the feed is
        // unreachable, so the reload drops the tile and logs.
        bridge
            .reload_tile(
                TileName::new("shop").unwrap(),
                serde_json::json!({ "name": "shop" }),
            )
            .await;

        assert!(
            !h.orchestrator
                .is_active(&TileName::new("shop").unwrap())
                .await
        );
    }
}
