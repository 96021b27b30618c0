//! Message-bus topology
//!
//! The single catalog of exchanges and routing keys shared by every producer and
//! consumer. Processes never build routing strings themselves; they name a
//! [`Topic`] and ask the [`Topology`] for its [`Route`].
//!
//! Adding a topic is a breaking change for the catalog but not for deployed
//! consumers: [`Topic::from_routing_key`] returns `None` for keys it does not know,
//! and consumers skip such messages.

use crate::alerts::AlertKind;
use crate::events::EventFamily;
use std::fmt;

/// Default exchange namespace
pub const DEFAULT_NAMESPACE: &str = "zerotrace";

/// Named routing domains on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Exchange {
    Events,
    Alerts,
    Actions,
    Incidents,
}

impl Exchange {
    pub const ALL: [Exchange; 4] = [
        Exchange::Events,
        Exchange::Alerts,
        Exchange::Actions,
        Exchange::Incidents,
    ];

    /// Exchange name without its namespace prefix
    pub fn suffix(&self) -> &'static str {
        match self {
            Exchange::Events => "events",
            Exchange::Alerts => "alerts",
            Exchange::Actions => "actions",
            Exchange::Incidents => "incidents",
        }
    }

    /// Topics bound to this exchange
    pub fn topics(&self) -> Vec<Topic> {
        Topic::ALL
            .iter()
            .copied()
            .filter(|topic| topic.exchange() == *self)
            .collect()
    }
}

/// A category of message on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    // Raw events from collectors
    RawProcesses,
    RawNetwork,
    RawFilesystem,
    RawPersistence,

    // Alerts from analyzers
    AlertHighIoc,
    AlertMediumYara,
    AlertLowBehavior,
    AlertCriticalDeception,

    // Response actions
    ActionKillProcess,
    ActionIsolateHost,
    ActionGetFile,
    ActionCollectForensics,

    IncidentCritical,
}

impl Topic {
    pub const ALL: [Topic; 13] = [
        Topic::RawProcesses,
        Topic::RawNetwork,
        Topic::RawFilesystem,
        Topic::RawPersistence,
        Topic::AlertHighIoc,
        Topic::AlertMediumYara,
        Topic::AlertLowBehavior,
        Topic::AlertCriticalDeception,
        Topic::ActionKillProcess,
        Topic::ActionIsolateHost,
        Topic::ActionGetFile,
        Topic::ActionCollectForensics,
        Topic::IncidentCritical,
    ];

    pub fn routing_key(&self) -> &'static str {
        match self {
            Topic::RawProcesses => "events.raw.processes",
            Topic::RawNetwork => "events.raw.network",
            Topic::RawFilesystem => "events.raw.filesystem",
            Topic::RawPersistence => "events.raw.persistence",
            Topic::AlertHighIoc => "alerts.high.ioc_match",
            Topic::AlertMediumYara => "alerts.medium.yara_match",
            Topic::AlertLowBehavior => "alerts.low.behavior",
            Topic::AlertCriticalDeception => "alerts.critical.deception",
            Topic::ActionKillProcess => "actions.request.kill_process",
            Topic::ActionIsolateHost => "actions.request.isolate_host",
            Topic::ActionGetFile => "actions.request.get_file",
            Topic::ActionCollectForensics => "actions.request.collect_forensics",
            Topic::IncidentCritical => "incidents.critical",
        }
    }

    pub fn exchange(&self) -> Exchange {
        match self {
            Topic::RawProcesses
            | Topic::RawNetwork
            | Topic::RawFilesystem
            | Topic::RawPersistence => Exchange::Events,
            Topic::AlertHighIoc
            | Topic::AlertMediumYara
            | Topic::AlertLowBehavior
            | Topic::AlertCriticalDeception => Exchange::Alerts,
            Topic::ActionKillProcess
            | Topic::ActionIsolateHost
            | Topic::ActionGetFile
            | Topic::ActionCollectForensics => Exchange::Actions,
            Topic::IncidentCritical => Exchange::Incidents,
        }
    }

    /// Topic raw events of `family` are published on
    pub fn for_family(family: EventFamily) -> Topic {
        match family {
            EventFamily::Process => Topic::RawProcesses,
            EventFamily::Network => Topic::RawNetwork,
            EventFamily::File => Topic::RawFilesystem,
            EventFamily::Persistence => Topic::RawPersistence,
        }
    }

    /// Topic alerts of `kind` are published on
    pub fn for_alert(kind: AlertKind) -> Topic {
        match kind {
            AlertKind::IocMatch => Topic::AlertHighIoc,
            AlertKind::YaraMatch => Topic::AlertMediumYara,
            AlertKind::Behavior => Topic::AlertLowBehavior,
            AlertKind::Deception => Topic::AlertCriticalDeception,
        }
    }

    /// Look up a topic by routing key; `None` for keys outside the catalog
    pub fn from_routing_key(key: &str) -> Option<Topic> {
        Topic::ALL
            .iter()
            .copied()
            .find(|topic| topic.routing_key() == key)
    }

    /// Payload family carried by a raw-event topic
    pub fn event_family(&self) -> Option<EventFamily> {
        match self {
            Topic::RawProcesses => Some(EventFamily::Process),
            Topic::RawNetwork => Some(EventFamily::Network),
            Topic::RawFilesystem => Some(EventFamily::File),
            Topic::RawPersistence => Some(EventFamily::Persistence),
            _ => None,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.routing_key())
    }
}

/// Where to publish a message: a fully-qualified exchange name and a routing key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    pub exchange: String,
    pub routing_key: &'static str,
}

/// The catalog bound to a concrete exchange namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    namespace: String,
}

impl Default for Topology {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl Topology {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Fully-qualified exchange name, e.g. `zerotrace.alerts`
    pub fn exchange_name(&self, exchange: Exchange) -> String {
        format!("{}.{}", self.namespace, exchange.suffix())
    }

    pub fn route(&self, topic: Topic) -> Route {
        Route {
            exchange: self.exchange_name(topic.exchange()),
            routing_key: topic.routing_key(),
        }
    }

    pub fn route_for_family(&self, family: EventFamily) -> Route {
        self.route(Topic::for_family(family))
    }

    pub fn route_for_alert(&self, kind: AlertKind) -> Route {
        self.route(Topic::for_alert(kind))
    }
}
