use std::fmt;

use crate::socket::encode_component;

/// Endpoint bindings for every CRUD resource the backend exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    Bots,
    Steps,
    Channels,
    Requests,
    Widgets,
    Templates,
    TemplateGroups,
    TemplateInstances,
    Crons,
    Notes,
    Emitters,
    Messages,
    Connections,
    ConnectionGroups,
    Users,
    /// Credentials live under their owning bot.
    Credentials { bot_id: String },
}

impl ResourceKind {
    /// Kinds addressable by name from the CLI (credentials need a bot id).
    pub const NAMED: [ResourceKind; 15] = [
        ResourceKind::Bots,
        ResourceKind::Steps,
        ResourceKind::Channels,
        ResourceKind::Requests,
        ResourceKind::Widgets,
        ResourceKind::Templates,
        ResourceKind::TemplateGroups,
        ResourceKind::TemplateInstances,
        ResourceKind::Crons,
        ResourceKind::Notes,
        ResourceKind::Emitters,
        ResourceKind::Messages,
        ResourceKind::Connections,
        ResourceKind::ConnectionGroups,
        ResourceKind::Users,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::Bots => "bots",
            ResourceKind::Steps => "steps",
            ResourceKind::Channels => "channels",
            ResourceKind::Requests => "requests",
            ResourceKind::Widgets => "widgets",
            ResourceKind::Templates => "templates",
            ResourceKind::TemplateGroups => "template_group",
            ResourceKind::TemplateInstances => "template_instance",
            ResourceKind::Crons => "crons",
            ResourceKind::Notes => "notes",
            ResourceKind::Emitters => "emitters",
            ResourceKind::Messages => "messages",
            ResourceKind::Connections => "connections",
            ResourceKind::ConnectionGroups => "connection_groups",
            ResourceKind::Users => "users",
            ResourceKind::Credentials { .. } => "credentials",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMED.into_iter().find(|k| k.name() == name)
    }

    /// `GET`/`POST` path, always with a trailing slash.
    pub fn collection_path(&self) -> String {
        match self {
            ResourceKind::Credentials { bot_id } => {
                format!("/bots/{}/credentials/", encode_component(bot_id))
            }
            other => format!("/{}/", other.name()),
        }
    }

    /// `GET`/`PATCH`/`DELETE` path for one entity.
    pub fn item_path(&self, id: &str) -> String {
        format!("{}{}", self.collection_path(), encode_component(id))
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
