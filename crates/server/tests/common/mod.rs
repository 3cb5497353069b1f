//! Shared fixtures: the to-do task publication and methods, and a peer that
//! shuttles frames between a `Client` and a `Hub` in-process.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use strand_client::{Client, ClientConfig};
use strand_core::{
    ConnectionId, Document, DocumentId, Error, FieldDelta, Fields, Query, Value, ID_FIELD,
};
use strand_protocol::{codec, ServerMessage};
use strand_server::{arg, FrameReceiver, Hub, ServerConfig};
use strand_storage::{DocumentStore, MemoryStore};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn task_fields(text: &str, checked: bool, created_at: i64) -> Fields {
    [
        ("text".to_string(), Value::from(text)),
        ("isChecked".to_string(), Value::from(checked)),
        ("createdAt".to_string(), Value::Timestamp(created_at)),
    ]
    .into_iter()
    .collect()
}

/// Store with `n` unchecked tasks `task-1` ..= `task-n`.
pub fn seeded_store(n: usize) -> Arc<MemoryStore> {
    let docs = (1..=n).map(|i| {
        Document::new(
            DocumentId::new(format!("task-{i}")),
            task_fields(&format!("Task {i}"), false, i as i64),
        )
    });
    Arc::new(MemoryStore::with_documents(docs).unwrap())
}

fn id_arg(args: &Value) -> strand_core::Result<DocumentId> {
    arg(args, ID_FIELD)?
        .as_str()
        .map(DocumentId::new)
        .ok_or_else(|| Error::validation("_id must be a string"))
}

pub fn register_tasks(hub: &mut Hub) {
    hub.publish("tasks", |_, _| Ok(Some(Query::all())));

    hub.method("tasks.insert", |ctx, args| {
        let text = arg(args, "text")?.as_str().unwrap_or_default();
        if text.trim().is_empty() {
            return Err(Error::validation("text is required"));
        }
        let mut fields = args.as_map().cloned().unwrap_or_default();
        fields.remove(ID_FIELD);
        fields.entry("isChecked".to_string()).or_insert(Value::Bool(false));
        let id = ctx.store().insert(Document::from_fields(fields))?;
        Ok(Value::from(id.as_str()))
    });

    hub.method("tasks.toggleChecked", |ctx, args| {
        let id = id_arg(args)?;
        let checked = arg(args, "isChecked")?
            .as_bool()
            .ok_or_else(|| Error::validation("isChecked must be a boolean"))?;
        if !ctx.store().update(&id, &FieldDelta::new().with_set("isChecked", !checked))? {
            return Err(Error::not_found(id));
        }
        Ok(Value::from(1))
    });

    hub.method("tasks.delete", |ctx, args| {
        let id = id_arg(args)?;
        Ok(Value::from(ctx.store().remove(&id)? as i64))
    });
}

pub fn tasks_hub(store: Arc<MemoryStore>) -> Hub {
    let mut hub = Hub::new(store, ServerConfig::default()).unwrap();
    register_tasks(&mut hub);
    hub
}

/// A client with local simulations of the task methods.
pub fn task_client(config: ClientConfig) -> Client {
    let mut client = Client::new(config);
    client.register_insert_simulation("tasks.insert", |ctx, args| {
        let mut fields = args.as_map().cloned().unwrap_or_default();
        fields.entry("isChecked".to_string()).or_insert(Value::Bool(false));
        ctx.insert(fields)?;
        Ok(())
    });
    client.register_simulation("tasks.toggleChecked", |ctx, args| {
        let id = id_arg(args)?;
        let checked = args.get("isChecked").and_then(Value::as_bool).unwrap_or(false);
        ctx.update(&id, FieldDelta::new().with_set("isChecked", !checked));
        Ok(())
    });
    client.register_simulation("tasks.delete", |ctx, args| {
        let id = id_arg(args)?;
        ctx.remove(&id);
        Ok(())
    });
    client
}

/// Documents keyed by id, for comparing a client view with the store.
pub fn contents(docs: Vec<Document>) -> BTreeMap<DocumentId, Fields> {
    docs.into_iter().map(Document::into_parts).collect()
}

pub fn store_contents(store: &MemoryStore) -> BTreeMap<DocumentId, Fields> {
    contents(store.find(&Query::all()).unwrap())
}

pub fn view_contents(client: &Client) -> BTreeMap<DocumentId, Fields> {
    contents(client.find(&Query::all()))
}

/// A client wired to a hub connection without any transport.
pub struct Peer {
    pub client: Client,
    pub connection: ConnectionId,
    pub log: Vec<ServerMessage>,
    user: Option<String>,
    rx: FrameReceiver,
}

impl Peer {
    pub fn open(hub: &mut Hub, user: Option<&str>) -> Self {
        Self::with_config(hub, user, ClientConfig::default())
    }

    pub fn with_config(hub: &mut Hub, user: Option<&str>, config: ClientConfig) -> Self {
        let user = user.map(str::to_string);
        let (connection, rx) = hub.open(user.clone());
        let mut client = task_client(config);
        client.connect();
        Self {
            client,
            connection,
            log: Vec::new(),
            user,
            rx,
        }
    }

    /// Exchanges frames until both sides are quiet.
    pub fn flush(&mut self, hub: &mut Hub) {
        loop {
            let sent = self.send_only(hub);
            hub.pump();
            let mut received = false;
            while let Ok(frame) = self.rx.try_recv() {
                received = true;
                self.log.push(codec::decode(&frame).unwrap());
                let _ = self.client.receive_frame(&frame);
            }
            if !sent && !received {
                break;
            }
        }
    }

    /// Delivers the client's queued frames to the hub. Returns true if
    /// anything was sent.
    pub fn send_only(&mut self, hub: &mut Hub) -> bool {
        let frames = self.client.drain_frames().unwrap();
        let sent = !frames.is_empty();
        for frame in frames {
            let _ = hub.handle_frame(self.connection, &frame);
        }
        sent
    }

    /// Throws away everything the hub queued for this peer.
    pub fn lose_inbound(&mut self) -> usize {
        let mut lost = 0;
        while self.rx.try_recv().is_ok() {
            lost += 1;
        }
        lost
    }

    pub fn drop_connection(&mut self, hub: &mut Hub) {
        self.client.connection_lost();
        hub.close(self.connection);
    }

    pub fn reconnect(&mut self, hub: &mut Hub) {
        let (connection, rx) = hub.open(self.user.clone());
        self.connection = connection;
        self.rx = rx;
        self.client.connect();
    }

    pub fn count(&self, matches: impl Fn(&ServerMessage) -> bool) -> usize {
        self.log.iter().filter(|m| matches(m)).count()
    }
}
