use {super::principal::RequestContext, uuid::Uuid};

#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub id: Uuid,
    pub actor: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<Uuid>,
    pub event_id: Option<String>,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl NewAuditEntry {
    pub fn new(actor: &str, action: &str, resource_type: &str) -> Self {
        Self {
            id: Uuid::now_v7(),
            actor: actor.to_string(),
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id: None,
            event_id: None,
            before: None,
            after: None,
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn resource(mut self, id: Uuid) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn event(mut self, event_id: &str) -> Self {
        self.event_id = Some(event_id.to_string());
        self
    }

    pub fn before(mut self, value: serde_json::Value) -> Self {
        self.before = Some(value);
        self
    }

    pub fn after(mut self, value: serde_json::Value) -> Self {
        self.after = Some(value);
        self
    }

    pub fn request(mut self, ctx: &RequestContext) -> Self {
        self.ip_address = ctx.ip.clone();
        self.user_agent = ctx.user_agent.clone();
        self
    }
}

pub const ACTOR_WEBHOOK: &str = "webhook:stripe";
pub const ACTOR_INTEGRITY: &str = "cron:integrity";

pub fn user_actor(id: impl std::fmt::Display) -> String {
    format!("user:{id}")
}
