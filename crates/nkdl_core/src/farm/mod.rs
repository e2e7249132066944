//! Render farm transports.
//!
//! Everything above this module talks to the farm through the [`Connection`]
//! trait. Two transports exist:
//!
//! - [`WebServiceConnection`]: JSON over the farm's REST API
//! - [`CommandLineConnection`]: job files handed to the command client
//!
//! [`connect`] picks one from settings, falling back from the web service to
//! the command line when allowed. The caller owns the returned handle and
//! passes it to the orchestrator.

mod command_line;
mod connection;
mod web_service;

pub use command_line::{find_command, parse_job_id, CommandLineConnection};
pub use connection::{
    Connection, DryRunConnection, FarmError, FarmResult, RecordedJob, Records, SharedConnection,
};
pub use web_service::{parse_job_response, WebServiceConnection};

#[cfg(test)]
pub(crate) use connection::testing;

use crate::config::FarmSettings;

/// Open a connection as configured.
pub fn connect(settings: &FarmSettings) -> FarmResult<Box<dyn Connection + Send>> {
    if settings.use_web_service {
        let attempt = WebServiceConnection::new(settings).and_then(|mut connection| {
            connection.connect()?;
            Ok(connection)
        });
        match attempt {
            Ok(connection) => return Ok(Box::new(connection)),
            Err(e) if settings.commandline_on_fail => {
                tracing::warn!("Web service unavailable ({}); using the command line", e);
            }
            Err(e) => return Err(e),
        }
    }

    let mut connection = CommandLineConnection::locate(settings.command_path.as_deref())?;
    connection.connect()?;
    Ok(Box::new(connection))
}
