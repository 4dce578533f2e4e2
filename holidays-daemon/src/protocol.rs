//! Newline-delimited JSON over the daemon's Unix socket.
//!
//! ```text
//! → {"cmd":"show","name":"Independence Day"}
//! ← {"ok":true,"data":{"country":"US","name":"Independence Day","date":"2017-07-04"}}
//! ```

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

/// One request line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub cmd: String,
    /// Holiday name for `show`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `YYYY-MM-DD` override for `today`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl DaemonRequest {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            ..Self::default()
        }
    }
}

/// One response line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Send one JSON request to the daemon socket and return one response.
pub fn send_request(home: &Path, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    let socket = socket_path(home);
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning { socket });
    }

    let mut stream = UnixStream::connect(&socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            DaemonError::DaemonNotRunning {
                socket: socket.clone(),
            }
        } else {
            io_err(&socket, err)
        }
    })?;

    let mut payload = serde_json::to_string(request)?;
    payload.push('\n');
    stream
        .write_all(payload.as_bytes())
        .map_err(|e| io_err(&socket, e))?;
    stream.flush().map_err(|e| io_err(&socket, e))?;

    let mut line = String::new();
    let read = BufReader::new(stream)
        .read_line(&mut line)
        .map_err(|e| io_err(&socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }

    Ok(serde_json::from_str(line.trim_end())?)
}

/// `status`, retrying briefly while a freshly started daemon binds its socket.
pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    let request = DaemonRequest::new("status");
    let mut attempts = 0;
    loop {
        match send_request(home, &request) {
            Ok(response) => return response_into_data(response),
            Err(DaemonError::DaemonNotRunning { .. }) if attempts < 4 => {
                attempts += 1;
                sleep(Duration::from_millis(100));
            }
            Err(err) => return Err(err),
        }
    }
}

pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    response_into_data(send_request(home, &DaemonRequest::new("stop"))?).map(|_| ())
}

pub fn request_sync(home: &Path) -> Result<Value, DaemonError> {
    response_into_data(send_request(home, &DaemonRequest::new("sync"))?)
}

pub fn request_list(home: &Path) -> Result<Value, DaemonError> {
    response_into_data(send_request(home, &DaemonRequest::new("list"))?)
}

pub fn request_today(home: &Path, date: Option<String>) -> Result<Value, DaemonError> {
    let request = DaemonRequest {
        date,
        ..DaemonRequest::new("today")
    };
    response_into_data(send_request(home, &request)?)
}

pub fn request_show(home: &Path, name: &str) -> Result<Value, DaemonError> {
    let request = DaemonRequest {
        name: Some(name.to_string()),
        ..DaemonRequest::new("show")
    };
    response_into_data(send_request(home, &request)?)
}

fn response_into_data(response: DaemonResponse) -> Result<Value, DaemonError> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(DaemonError::Protocol(
            response
                .error
                .unwrap_or_else(|| "unknown daemon error".to_string()),
        ))
    }
}
