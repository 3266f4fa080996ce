use crate::Kind;
use prometheus_client::{
    encoding::{EncodeLabelSet, EncodeLabelValue},
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};
use vsync_controller_core::RouteKind;

#[derive(Clone, Debug, Default)]
pub struct IndexMetrics {
    index_applies: Family<KindLabels, Counter>,
    index_deletes: Family<KindLabels, Counter>,
    resolutions: Family<ResolveLabels, Counter>,
    resyncs: Family<RouteLabels, Counter>,
    status_updates_deferred: Counter,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct KindLabels {
    kind: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ResolveLabels {
    route_kind: String,
    kind: String,
    outcome: Outcome,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
enum Outcome {
    Affected,
    Unaffected,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct RouteLabels {
    route_kind: String,
}

impl IndexMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let metrics = Self::default();

        prom.register(
            "index_applies",
            "Count of applies to the index",
            metrics.index_applies.clone(),
        );
        prom.register(
            "index_deletes",
            "Count of deletes to the index",
            metrics.index_deletes.clone(),
        );
        prom.register(
            "resolutions",
            "Count of change resolutions by route kind and changed kind",
            metrics.resolutions.clone(),
        );
        prom.register(
            "resyncs",
            "Count of routes enqueued for rebuild",
            metrics.resyncs.clone(),
        );
        prom.register(
            "status_updates_deferred",
            "Count of status updates deferred because the status queue was full",
            metrics.status_updates_deferred.clone(),
        );

        metrics
    }

    pub(crate) fn applied(&self, kind: Kind) {
        self.index_applies
            .get_or_create(&KindLabels {
                kind: kind.to_string(),
            })
            .inc();
    }

    pub(crate) fn deleted(&self, kind: Kind) {
        self.index_deletes
            .get_or_create(&KindLabels {
                kind: kind.to_string(),
            })
            .inc();
    }

    pub(crate) fn resolved(&self, route_kind: RouteKind, kind: Kind, affected: bool) {
        self.resolutions
            .get_or_create(&ResolveLabels {
                route_kind: route_kind.to_string(),
                kind: kind.to_string(),
                outcome: if affected {
                    Outcome::Affected
                } else {
                    Outcome::Unaffected
                },
            })
            .inc();
    }

    pub(crate) fn resynced(&self, route_kind: RouteKind) {
        self.resyncs
            .get_or_create(&RouteLabels {
                route_kind: route_kind.to_string(),
            })
            .inc();
    }

    pub(crate) fn status_deferred(&self) {
        self.status_updates_deferred.inc();
    }
}
