//! Command execution against a live session

use crate::cli::{ChangeArgs, Commands, SearchArgs};
use crate::error::{CliError, CliResult};
use crate::formatter::{Formatter, ServerReport};
use bmlt_client::{
    ChannelObserver, Event, Notification, OperationId, ReferenceCache, Session, SessionConfig,
};
use bmlt_protocol::{
    ChangeListFilter, Coordinate, GeoArea, IdFilter, Radius, SearchDimension, TextSearch, Weekday,
};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

/// Execute CLI commands
#[derive(Debug)]
pub struct CommandExecutor {
    /// Output formatter
    pub formatter: Formatter,
    config: SessionConfig,
    root_uri: String,
}

/// A bootstrapped session and its notification stream
struct Connected {
    session: Session,
    cache: Arc<ReferenceCache>,
    notifications: UnboundedReceiver<Notification>,
}

impl Connected {
    /// Wait for the terminal notification of `operation`.
    ///
    /// An `error_occurred` for the operation arrives before its terminal
    /// notification and ends the wait with that error.
    async fn completion(&mut self, operation: OperationId, what: &'static str) -> CliResult<Event> {
        while let Some(notification) = self.notifications.recv().await {
            if notification.context.operation != operation {
                continue;
            }
            return match notification.event {
                Event::ErrorOccurred(error) => Err(error.into()),
                event => Ok(event),
            };
        }
        Err(CliError::SessionClosed(what))
    }
}

impl CommandExecutor {
    /// Executor for one root server
    #[must_use]
    pub fn new(formatter: Formatter, config: SessionConfig, root_uri: impl Into<String>) -> Self {
        Self {
            formatter,
            config,
            root_uri: root_uri.into(),
        }
    }

    /// Execute a command
    ///
    /// # Errors
    ///
    /// Bootstrap failures, refused operations, and output errors.
    pub async fn execute(&self, command: Commands) -> CliResult<()> {
        let mut connected = self.connect().await?;
        let result = match command {
            Commands::Validate => self.validate(&connected),
            Commands::Formats { used, language } => {
                self.formats(&mut connected, used, language.as_deref()).await
            }
            Commands::ServiceBodies => self
                .formatter
                .display_service_bodies(connected.cache.service_bodies()),
            Commands::Search(args) => self.search(&mut connected, args).await,
            Commands::Changes(args) => self.changes(&mut connected, args).await,
        };
        if let Some(metrics) = connected.session.gateway_metrics() {
            debug!(
                requests = metrics.requests,
                failures = metrics.failures,
                bytes = metrics.bytes_received,
                "gateway totals"
            );
        }
        connected.session.shutdown();
        result
    }

    async fn connect(&self) -> CliResult<Connected> {
        let (observer, notifications) = ChannelObserver::new();
        let session = Session::builder()
            .config(self.config.clone())
            .observer(Arc::new(observer))
            .connect(&self.root_uri);
        let cache = session.wait_ready().await?;
        info!(session = %session.id(), version = %cache.server_info().version, "server validated");
        Ok(Connected {
            session,
            cache,
            notifications,
        })
    }

    fn validate(&self, connected: &Connected) -> CliResult<()> {
        let report = ServerReport::new(&self.root_uri, &connected.cache);
        self.formatter.display_server(&report)
    }

    async fn formats(
        &self,
        connected: &mut Connected,
        used: bool,
        language: Option<&str>,
    ) -> CliResult<()> {
        let language = match language {
            Some(code) => code.to_string(),
            None => connected
                .cache
                .default_language()
                .map(|l| l.key.clone())
                .unwrap_or_else(|| connected.cache.server_info().native_language.clone()),
        };

        let formats = if used {
            let operation = connected.session.fetch_all_used_formats()?;
            match connected.completion(operation, "used formats").await? {
                Event::FormatSearchResultsReady { formats, .. } => formats,
                _ => Vec::new(),
            }
        } else {
            connected.cache.formats().to_vec()
        };

        let formats: Vec<_> = formats
            .into_iter()
            .filter(|f| f.language == language)
            .collect();
        self.formatter.display_formats(&formats)
    }

    async fn search(&self, connected: &mut Connected, args: SearchArgs) -> CliResult<()> {
        for dimension in search_dimensions(args)? {
            connected.session.set_criterion(dimension);
        }
        let operation = connected.session.search()?;
        match connected.completion(operation, "search").await? {
            Event::SearchResultsReady(meetings) => self.formatter.display_meetings(&meetings),
            _ => Ok(()),
        }
    }

    async fn changes(&self, connected: &mut Connected, args: ChangeArgs) -> CliResult<()> {
        let filter = ChangeListFilter {
            meeting_id: args.meeting,
            service_body_id: args.service_body,
            start_date: args.from,
            end_date: args.to,
        };
        if let (Some(from), Some(to)) = (filter.start_date, filter.end_date)
            && from > to
        {
            return Err(CliError::InvalidArguments(format!(
                "--from {from} is after --to {to}"
            )));
        }

        let login = connected.session.login(args.user, args.password)?;
        connected.completion(login, "login").await?;

        let operation = connected.session.fetch_change_list(filter)?;
        let outcome = match connected.completion(operation, "change list").await {
            Ok(Event::ChangeListReady(changes)) => self.formatter.display_changes(&changes),
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };

        let logout = connected.session.logout()?;
        if let Err(e) = connected.completion(logout, "logout").await {
            debug!(error = %e, "logout not acknowledged");
        }
        outcome
    }
}

/// Turn search flags into criteria
pub(crate) fn search_dimensions(args: SearchArgs) -> CliResult<Vec<SearchDimension>> {
    let mut dimensions = Vec::new();

    if let Some(text) = args.text.filter(|t| !t.trim().is_empty()) {
        dimensions.push(SearchDimension::Text(TextSearch::new(text)));
    }

    if !args.weekdays.is_empty() {
        let days = args
            .weekdays
            .iter()
            .map(|&d| {
                Weekday::from_index(d)
                    .ok_or_else(|| CliError::InvalidArguments(format!("weekday {d} is not in 1..=7")))
            })
            .collect::<CliResult<Vec<_>>>()?;
        dimensions.push(SearchDimension::Weekdays(IdFilter::including(days)));
    }

    if !args.service_bodies.is_empty() {
        dimensions.push(SearchDimension::ServiceBodies(IdFilter::including(
            args.service_bodies,
        )));
    }

    if !args.formats.is_empty() {
        dimensions.push(SearchDimension::Formats(IdFilter::including(args.formats)));
    }

    if let (Some(lat), Some(lon)) = (args.lat, args.lon) {
        let center = Coordinate::new(lat, lon);
        if !center.is_valid() {
            return Err(CliError::InvalidArguments(format!(
                "{lat}, {lon} is not a valid coordinate"
            )));
        }
        let radius = match (args.radius, args.count) {
            (Some(distance), _) if distance > 0.0 => Radius::Distance(distance),
            (Some(distance), _) => {
                return Err(CliError::InvalidArguments(format!(
                    "--radius must be positive, got {distance}"
                )));
            }
            (None, Some(count)) if count > 0 => Radius::MeetingCount(count),
            _ => {
                return Err(CliError::InvalidArguments(
                    "--lat/--lon need --radius or a positive --count".to_string(),
                ));
            }
        };
        dimensions.push(SearchDimension::Area(GeoArea { center, radius }));
    }

    Ok(dimensions)
}
