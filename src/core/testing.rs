//! In-memory router used by unit tests.
//!
//! Menus are tables of records keyed by command path prefix
//! (`/ip/firewall/filter`); `print`, `add` and `remove` behave the way the
//! router does for the fields the tests care about.
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    core::sentence::{Record, Reply, Sentence, Word},
    ports::{
        file_transport::{FileTransport, FileTransportError, FileTransportResult},
        mgmt_transport::{MgmtConnector, MgmtSession, TransportError, TransportResult},
        ship_directory::{CrewAccount, DirectoryError, DirectoryResult, RouterEndpoint, ShipDirectory},
    },
};

#[derive(Debug, Default)]
pub struct RouterState {
    pub tables: BTreeMap<String, Vec<Record>>,
    pub next_id: u64,
    pub sent: Vec<Sentence>,
    pub opened: usize,
    pub closed: usize,
    pub connect_error: Option<TransportError>,
    /// Command path that answers with a trap carrying this message
    pub trap_on: Option<(String, String)>,
    /// Command path after which the connection drops
    pub drop_after: Option<String>,
    /// Command path whose reply never arrives
    pub hang_on: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeRouter {
    pub state: Arc<Mutex<RouterState>>,
}

impl FakeRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut RouterState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    /// Seed a record into `menu`, assigning an id
    pub fn seed(&self, menu: &str, fields: &[(&str, &str)]) -> String {
        self.with(|s| {
            s.next_id += 1;
            let id = format!("*{:X}", s.next_id);
            let mut record = Record::default();
            record.insert(".id", id.clone());
            for (k, v) in fields {
                record.insert(*k, *v);
            }
            s.tables.entry(menu.to_string()).or_default().push(record);
            id
        })
    }

    pub fn table(&self, menu: &str) -> Vec<Record> {
        self.with(|s| s.tables.get(menu).cloned().unwrap_or_default())
    }

    pub fn refuse_connections(&self, err: TransportError) {
        self.with(|s| s.connect_error = Some(err));
    }

    pub fn trap_on(&self, command: &str, message: &str) {
        self.with(|s| s.trap_on = Some((command.to_string(), message.to_string())));
    }

    pub fn sent_heads(&self) -> Vec<String> {
        self.with(|s| {
            s.sent
                .iter()
                .filter_map(|x| x.head().map(str::to_string))
                .collect()
        })
    }

    pub fn open_sessions(&self) -> usize {
        self.with(|s| s.opened - s.closed)
    }

    pub fn session(&self) -> FakeSession {
        self.with(|s| s.opened += 1);
        FakeSession {
            router: self.clone(),
            closed: false,
            dropped: false,
        }
    }

    fn execute(&self, sentence: &Sentence) -> TransportResult<Reply> {
        let mut s = self.state.lock().unwrap();
        s.sent.push(sentence.clone());
        let path = sentence.head().unwrap_or_default().to_string();

        if let Some((command, message)) = &s.trap_on {
            if *command == path {
                return Err(TransportError::Trap {
                    category: None,
                    message: message.clone(),
                });
            }
        }

        let mut attrs = Record::default();
        let mut queries = Vec::new();
        for word in &sentence.words()[1..] {
            match Word::classify(word) {
                Word::Attribute { key, value } => attrs.insert(key, value),
                Word::Query { key, value } => queries.push((key.to_string(), value.to_string())),
                _ => {}
            }
        }

        let (menu, action) = path.rsplit_once('/').unwrap_or(("", path.as_str()));
        let menu = menu.to_string();
        let mut reply = Reply::default();
        match action {
            "print" => {
                reply.re = s
                    .tables
                    .get(&menu)
                    .map(|rows| {
                        rows.iter()
                            .filter(|r| queries.iter().all(|(k, v)| r.get(k) == Some(v.as_str())))
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
            }
            "add" => {
                s.next_id += 1;
                let id = format!("*{:X}", s.next_id);
                attrs.insert(".id", id.clone());
                s.tables.entry(menu).or_default().push(attrs);
                reply.done.insert("ret", id);
            }
            "remove" => {
                let id = attrs.get(".id").unwrap_or_default().to_string();
                let rows = s.tables.entry(menu).or_default();
                let before = rows.len();
                rows.retain(|r| r.id() != Some(id.as_str()));
                if rows.len() == before {
                    return Err(TransportError::Trap {
                        category: None,
                        message: "no such item".into(),
                    });
                }
            }
            "monitor-traffic" => {
                reply.re = s.tables.get("/interface/traffic").cloned().unwrap_or_default();
            }
            _ => {}
        }
        Ok(reply)
    }
}

#[async_trait]
impl MgmtConnector for FakeRouter {
    async fn connect(
        &self,
        _endpoint: &RouterEndpoint,
        _dial_timeout: Duration,
    ) -> TransportResult<Box<dyn MgmtSession>> {
        if let Some(err) = self.with(|s| s.connect_error.clone()) {
            return Err(err);
        }
        Ok(Box::new(self.session()))
    }
}

pub struct FakeSession {
    router: FakeRouter,
    closed: bool,
    dropped: bool,
}

#[async_trait]
impl MgmtSession for FakeSession {
    async fn run(&mut self, sentence: Sentence) -> TransportResult<Reply> {
        if self.closed || self.dropped {
            return Err(TransportError::Unreachable("session closed".into()));
        }
        let head = sentence.head().map(str::to_string);
        if head.is_some() && self.router.with(|s| s.hang_on.clone()) == head {
            std::future::pending::<()>().await;
        }
        let result = self.router.execute(&sentence);
        if head.is_some() && self.router.with(|s| s.drop_after.clone()) == head {
            self.dropped = true;
            return Err(TransportError::Unreachable("connection reset by peer".into()));
        }
        result
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.router.with(|s| s.closed += 1);
        }
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            self.router.with(|s| s.closed += 1);
        }
    }
}

pub fn endpoint(ship_id: &str, host: &str) -> RouterEndpoint {
    RouterEndpoint {
        ship_id: ship_id.to_string(),
        host: host.to_string(),
        mgmt_port: RouterEndpoint::DEFAULT_MGMT_PORT,
        ssh_port: RouterEndpoint::DEFAULT_SSH_PORT,
        user: "admin".to_string(),
        password: "secret".to_string(),
        online: true,
    }
}

/// Fixed ship registry
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    pub ships: BTreeMap<String, (RouterEndpoint, Vec<CrewAccount>)>,
}

impl StaticDirectory {
    pub fn with_ship(mut self, endpoint: RouterEndpoint, crew: Vec<CrewAccount>) -> Self {
        self.ships.insert(endpoint.ship_id.clone(), (endpoint, crew));
        self
    }
}

#[async_trait]
impl ShipDirectory for StaticDirectory {
    async fn resolve(&self, ship_id: &str) -> DirectoryResult<RouterEndpoint> {
        self.ships
            .get(ship_id)
            .map(|(ep, _)| ep.clone())
            .ok_or_else(|| DirectoryError::NotFound(ship_id.to_string()))
    }

    async fn crew(&self, ship_id: &str) -> DirectoryResult<Vec<CrewAccount>> {
        self.ships
            .get(ship_id)
            .map(|(_, crew)| crew.clone())
            .ok_or_else(|| DirectoryError::NotFound(ship_id.to_string()))
    }
}

/// File channel that keeps uploads in memory
#[derive(Debug, Clone, Default)]
pub struct RecordingFiles {
    pub uploads: Arc<Mutex<Vec<(String, Bytes)>>>,
    pub fail: Option<String>,
}

#[async_trait]
impl FileTransport for RecordingFiles {
    async fn upload(
        &self,
        endpoint: &RouterEndpoint,
        file_name: &str,
        contents: Bytes,
        _dial_timeout: Duration,
    ) -> FileTransportResult<u64> {
        if let Some(reason) = &self.fail {
            return Err(FileTransportError::Connect {
                addr: endpoint.ssh_addr(),
                reason: reason.clone(),
            });
        }
        let len = contents.len() as u64;
        self.uploads
            .lock()
            .unwrap()
            .push((format!("/{file_name}"), contents));
        Ok(len)
    }
}

pub fn crew(username: &str, active: bool) -> CrewAccount {
    CrewAccount {
        username: username.to_string(),
        password: format!("{username}-pw"),
        data_plan: "DataPlan".to_string(),
        active,
    }
}
