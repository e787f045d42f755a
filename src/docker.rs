//! Client for the Docker Engine API.
//!
//! Implements the event source (`/events`) and the remediation sink
//! (`/containers/{id}/restart`) on top of `bollard`. An empty `docker.host`
//! connects the way the docker CLI does: `DOCKER_HOST` when it is set,
//! otherwise the local daemon socket.

use crate::core::{
    Actor, EventSource, RawEvent, RemediationError, Remediator, StreamError, Subscription,
    SubscriptionError,
};
use crate::filters::FilterQuery;
use async_trait::async_trait;
use bollard::container::RestartContainerOptions;
use bollard::errors::Error as BollardError;
use bollard::models::EventMessage;
use bollard::system::EventsOptions;
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::stream::{Stream, StreamExt};
use reqwest::Url;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

/// Events buffered between the stream reader and the event loop.
const EVENT_BUFFER: usize = 256;

/// Where the daemon is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockerEndpoint {
    /// `DOCKER_HOST` if set, otherwise the local socket.
    Defaults,
    /// Path of a unix socket.
    Unix(String),
    /// `host:port` spoken to over plain HTTP.
    Http(String),
}

impl DockerEndpoint {
    /// Parses `docker.host`: empty, `unix:///path`, `tcp://host:port` or
    /// `http://host:port`. Returns `None` for anything else.
    pub fn parse(host: &str) -> Option<Self> {
        let host = host.trim();
        if host.is_empty() {
            return Some(Self::Defaults);
        }
        if let Some(path) = host.strip_prefix("unix://") {
            let usable = cfg!(unix) && path.len() > 1 && path.starts_with('/');
            return usable.then(|| Self::Unix(path.to_string()));
        }

        let address = host
            .strip_prefix("tcp://")
            .or_else(|| host.strip_prefix("http://"))?
            .trim_end_matches('/');
        let parsed = Url::parse(&format!("http://{}", address)).ok()?;
        let bare = parsed.path() == "/" && parsed.query().is_none() && parsed.host_str().is_some();
        bare.then(|| Self::Http(address.to_string()))
    }
}

impl fmt::Display for DockerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DockerEndpoint::Defaults => f.write_str("DOCKER_HOST or local socket"),
            DockerEndpoint::Unix(path) => write!(f, "unix://{}", path),
            DockerEndpoint::Http(address) => write!(f, "http://{}", address),
        }
    }
}

pub struct DockerClient {
    docker: Docker,
    endpoint: DockerEndpoint,
}

impl DockerClient {
    /// Creates a client for `endpoint`. No connection is made until the
    /// first request.
    pub fn connect(endpoint: DockerEndpoint, timeout: Duration) -> Result<Self, BollardError> {
        let secs = timeout.as_secs().max(1);
        let docker = match &endpoint {
            DockerEndpoint::Defaults => Docker::connect_with_defaults()?,
            DockerEndpoint::Unix(path) => connect_unix(path, secs)?,
            DockerEndpoint::Http(address) => {
                Docker::connect_with_http(address, secs, API_DEFAULT_VERSION)?
            }
        };
        Ok(Self {
            docker: docker.with_timeout(timeout),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &DockerEndpoint {
        &self.endpoint
    }
}

#[cfg(unix)]
fn connect_unix(path: &str, secs: u64) -> Result<Docker, BollardError> {
    Docker::connect_with_unix(path, secs, API_DEFAULT_VERSION)
}

#[cfg(not(unix))]
fn connect_unix(_path: &str, _secs: u64) -> Result<Docker, BollardError> {
    Docker::connect_with_defaults()
}

#[async_trait]
impl EventSource for DockerClient {
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    async fn subscribe(&self, filter: &FilterQuery) -> Result<Subscription, SubscriptionError> {
        self.docker.ping().await.map_err(|e| match e {
            BollardError::DockerResponseServerError {
                status_code,
                message,
            } => SubscriptionError::Rejected {
                status: status_code,
                message,
            },
            other => SubscriptionError::Connect(other),
        })?;

        let options = EventsOptions::<String> {
            filters: filter.to_map(),
            ..Default::default()
        };
        let stream = self.docker.events(Some(options));
        info!("Subscribed to container events.");

        let (events_tx, events) = mpsc::channel(EVENT_BUFFER);
        let (errors_tx, errors) = mpsc::channel(1);
        tokio::spawn(pump_events(stream, events_tx, errors_tx));
        Ok(Subscription { events, errors })
    }
}

#[async_trait]
impl Remediator for DockerClient {
    #[instrument(skip(self))]
    async fn restart(
        &self,
        container_id: &str,
        stop_timeout: Duration,
    ) -> Result<(), RemediationError> {
        let options = RestartContainerOptions {
            t: isize::try_from(stop_timeout.as_secs()).unwrap_or(isize::MAX),
        };
        self.docker
            .restart_container(container_id, Some(options))
            .await
            .map_err(|e| match e {
                BollardError::DockerResponseServerError {
                    status_code,
                    message,
                } => RemediationError::Rejected {
                    status: status_code,
                    message,
                },
                other => RemediationError::Docker(other),
            })
    }
}

/// Forwards decoded events until the stream ends, breaks, or the
/// subscription is released. Sends `EndOfStream` or a transport error last.
async fn pump_events<S>(
    stream: S,
    events_tx: mpsc::Sender<RawEvent>,
    errors_tx: mpsc::Sender<StreamError>,
) where
    S: Stream<Item = Result<EventMessage, BollardError>>,
{
    futures_util::pin_mut!(stream);
    loop {
        let next = tokio::select! {
            _ = events_tx.closed() => {
                debug!("Subscription released, stopping event reader.");
                return;
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(message)) => {
                if events_tx.send(raw_event(message)).await.is_err() {
                    debug!("Subscription released, stopping event reader.");
                    return;
                }
            }
            Some(Err(e)) => {
                let _ = errors_tx.send(StreamError::Transport(e.to_string())).await;
                return;
            }
            None => {
                let _ = errors_tx.send(StreamError::EndOfStream).await;
                return;
            }
        }
    }
}

/// The runtime reports the status in `Action` and the container in `Actor`.
fn raw_event(message: EventMessage) -> RawEvent {
    let actor = message.actor.unwrap_or_default();
    let id = actor.id.unwrap_or_default();
    RawEvent {
        status: message.action.unwrap_or_default(),
        kind: message.typ.map(|kind| kind.to_string()).unwrap_or_default(),
        time: message.time,
        actor: Actor {
            id: id.clone(),
            attributes: actor.attributes.unwrap_or_default().into_iter().collect(),
        },
        id,
    }
}
