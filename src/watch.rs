//! Watch/resync event source and the reconcile dispatcher
//!
//! Each resource kind is watched independently. Watch notifications and a
//! periodic resync of every cached object are merged into one stream of
//! [`ResourceEvent`]s per kind. The resync is the only retry mechanism: a
//! reconcile that failed transiently is simply attempted again the next time
//! the object is re-delivered.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream};
use futures::StreamExt;
use kube::runtime::reflector::{self, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use serde::de::DeserializeOwned;
use tokio::time::{interval_at, Instant, Interval};
use tracing::{debug, warn};

use crate::controller::{error_policy, reconcile, Context};
use crate::crd::{SharedService, SharedServiceClient, SharedServiceSlice};

/// Resource kinds the operator watches
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    /// SharedService
    SharedService,
    /// SharedServiceSlice
    Slice,
    /// SharedServiceClient
    Client,
}

impl ResourceKind {
    /// All watched kinds
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::SharedService,
        ResourceKind::Slice,
        ResourceKind::Client,
    ];
}

/// Snapshot of a watched resource
#[derive(Clone, Debug)]
pub enum Resource {
    /// A SharedService snapshot
    SharedService(Arc<SharedService>),
    /// A SharedServiceSlice snapshot
    Slice(Arc<SharedServiceSlice>),
    /// A SharedServiceClient snapshot
    Client(Arc<SharedServiceClient>),
}

impl Resource {
    /// Kind of the snapshot
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::SharedService(_) => ResourceKind::SharedService,
            Resource::Slice(_) => ResourceKind::Slice,
            Resource::Client(_) => ResourceKind::Client,
        }
    }

    /// `namespace/name` of the snapshot
    pub fn key(&self) -> String {
        let (ns, name) = match self {
            Resource::SharedService(r) => (r.namespace(), r.name_any()),
            Resource::Slice(r) => (r.namespace(), r.name_any()),
            Resource::Client(r) => (r.namespace(), r.name_any()),
        };
        format!("{}/{}", ns.unwrap_or_default(), name)
    }
}

/// One delivery of a resource snapshot
///
/// Delivery is at-least-once and unordered; `deleted` marks the final
/// snapshot of a removed resource.
#[derive(Clone, Debug)]
pub struct ResourceEvent {
    /// Snapshot as observed
    pub resource: Resource,
    /// Whether the resource was deleted
    pub deleted: bool,
}

impl ResourceEvent {
    /// Event for a created or updated resource
    pub fn applied(resource: Resource) -> Self {
        Self {
            resource,
            deleted: false,
        }
    }

    /// Event for a deleted resource
    pub fn deleted(resource: Resource) -> Self {
        Self {
            resource,
            deleted: true,
        }
    }
}

/// Source of resource events, one stream per kind
pub trait EventSource: Send + Sync {
    /// Subscribe to events for `kind`
    fn subscribe(&self, kind: ResourceKind) -> BoxStream<'static, ResourceEvent>;
}

/// Event source backed by kube watchers with periodic resync
pub struct KubeEventSource {
    client: Client,
    namespace: String,
    resync_period: Duration,
}

impl KubeEventSource {
    /// Watch `namespace`, re-delivering every cached object each `resync_period`
    pub fn new(client: Client, namespace: impl Into<String>, resync_period: Duration) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            resync_period,
        }
    }
}

impl EventSource for KubeEventSource {
    fn subscribe(&self, kind: ResourceKind) -> BoxStream<'static, ResourceEvent> {
        let client = self.client.clone();
        let ns = self.namespace.as_str();
        match kind {
            ResourceKind::SharedService => watch_kind(
                Api::<SharedService>::namespaced(client, ns),
                self.resync_period,
                Resource::SharedService,
            ),
            ResourceKind::Slice => watch_kind(
                Api::<SharedServiceSlice>::namespaced(client, ns),
                self.resync_period,
                Resource::Slice,
            ),
            ResourceKind::Client => watch_kind(
                Api::<SharedServiceClient>::namespaced(client, ns),
                self.resync_period,
                Resource::Client,
            ),
        }
    }
}

fn watch_kind<K>(
    api: Api<K>,
    resync_period: Duration,
    wrap: fn(Arc<K>) -> Resource,
) -> BoxStream<'static, ResourceEvent>
where
    K: kube::Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    let (reader, writer) = reflector::store::<K>();

    let changes = reflector::reflector(writer, watcher(api, watcher::Config::default()))
        .default_backoff()
        .filter_map(move |event| async move {
            match event {
                Ok(watcher::Event::Apply(obj)) | Ok(watcher::Event::InitApply(obj)) => {
                    Some(ResourceEvent::applied(wrap(Arc::new(obj))))
                }
                Ok(watcher::Event::Delete(obj)) => Some(ResourceEvent::deleted(wrap(Arc::new(obj)))),
                Ok(watcher::Event::Init) | Ok(watcher::Event::InitDone) => None,
                Err(e) => {
                    warn!(error = %e, "Watch stream error");
                    None
                }
            }
        });

    let ticks = interval_at(Instant::now() + resync_period, resync_period);
    let resyncs = stream::unfold((ticks, reader), resync_tick).flat_map(move |objects| {
        stream::iter(
            objects
                .into_iter()
                .map(move |obj| ResourceEvent::applied(wrap(obj))),
        )
    });

    stream::select(changes, resyncs).boxed()
}

async fn resync_tick<K>(
    (mut ticks, reader): (Interval, Store<K>),
) -> Option<(Vec<Arc<K>>, (Interval, Store<K>))>
where
    K: kube::Resource<DynamicType = ()> + Clone + 'static,
{
    ticks.tick().await;
    let objects = reader.state();
    Some((objects, (ticks, reader)))
}

/// Feed every event from `source` through the reconciler until the streams end
///
/// Events run concurrently up to `max_concurrent`, including duplicate
/// deliveries of the same resource.
pub async fn dispatch(source: &dyn EventSource, ctx: Arc<Context>, max_concurrent: usize) {
    let streams: Vec<_> = ResourceKind::ALL
        .iter()
        .map(|kind| source.subscribe(*kind))
        .collect();

    stream::select_all(streams)
        .for_each_concurrent(max_concurrent, |event| {
            let ctx = ctx.clone();
            async move {
                match reconcile(&event, &ctx).await {
                    Ok(()) => debug!(resource = %event.resource.key(), "Reconciled"),
                    Err(error) => {
                        error_policy(&event, &error);
                    }
                }
            }
        })
        .await;
}
