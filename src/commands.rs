use std::sync::Arc;

use tracing::info;

use crate::cache::MonitorCache;
use crate::connection::ConnectionManager;
use crate::gateway::{CommandOption, CommandSpec, MessagingGateway, OptionKind};
use crate::store::TenantStore;

/// Reply colors, matching the visual language of the status pages.
const COLOR_SUCCESS: u32 = 0x00ff00;
const COLOR_REMOVAL: u32 = 0xff9900;
const COLOR_INFO: u32 = 0x0099ff;
const COLOR_ERROR: u32 = 0xff0000;

/// Autocomplete responses are capped by the chat platform.
const MAX_AUTOCOMPLETE_CHOICES: usize = 25;

/// Who invoked a command and for which tenant.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub tenant_id: String,
    pub user_id: String,
}

/// A fully parsed operator command; option decoding is the gateway
/// adapter's job.
#[derive(Debug, Clone)]
pub enum Command {
    Track { monitor_id: i64 },
    Untrack { monitor_id: i64 },
    TrackAll,
    GroupCreate { name: String },
    GroupDelete { name: String },
    GroupAssign { group: String, monitor_id: i64 },
    GroupUnassign { monitor_id: i64 },
    Groups,
    SetChannel { channel_id: String },
    SetTitle { title: String },
    ShowConfig,
}

/// Ephemeral reply shown only to the invoking operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub color: u32,
}

impl Reply {
    fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: COLOR_SUCCESS,
        }
    }

    fn removal(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: COLOR_REMOVAL,
        }
    }

    fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: COLOR_INFO,
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: COLOR_ERROR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutocompleteChoice {
    pub name: String,
    pub value: String,
}

/// Handles the operator command surface: admin gating, store mutations and
/// the ephemeral replies. Stateless beyond its shared handles.
pub struct CommandService {
    store: Arc<TenantStore>,
    cache: Arc<MonitorCache>,
    connection: Arc<ConnectionManager>,
    gateway: Arc<dyn MessagingGateway>,
    admin_user_ids: Vec<String>,
}

impl CommandService {
    pub fn new(
        store: Arc<TenantStore>,
        cache: Arc<MonitorCache>,
        connection: Arc<ConnectionManager>,
        gateway: Arc<dyn MessagingGateway>,
        admin_user_ids: Vec<String>,
    ) -> Self {
        Self {
            store,
            cache,
            connection,
            gateway,
            admin_user_ids,
        }
    }

    /// The command table registered with the chat platform at startup.
    pub fn specs() -> Vec<CommandSpec> {
        fn text(name: &'static str, description: &'static str, autocomplete: bool) -> CommandOption {
            CommandOption {
                name,
                description,
                kind: OptionKind::Text,
                required: true,
                autocomplete,
            }
        }

        vec![
            CommandSpec {
                name: "track",
                description: "Add a monitor to this server's status view",
                options: vec![text("monitor", "Monitor to track", true)],
            },
            CommandSpec {
                name: "untrack",
                description: "Remove a monitor from this server's status view",
                options: vec![text("monitor", "Monitor to stop tracking", true)],
            },
            CommandSpec {
                name: "track-all",
                description: "Show every monitor in this server's status view",
                options: Vec::new(),
            },
            CommandSpec {
                name: "group-create",
                description: "Create a display group",
                options: vec![text("name", "Group name", false)],
            },
            CommandSpec {
                name: "group-delete",
                description: "Delete a display group",
                options: vec![text("group", "Group to delete", true)],
            },
            CommandSpec {
                name: "group-add-monitor",
                description: "Assign a monitor to a display group",
                options: vec![
                    text("group", "Target group", true),
                    text("monitor", "Monitor to assign", true),
                ],
            },
            CommandSpec {
                name: "group-remove-monitor",
                description: "Remove a monitor from its display group",
                options: vec![text("monitor", "Monitor to ungroup", true)],
            },
            CommandSpec {
                name: "groups",
                description: "List display groups and their members",
                options: Vec::new(),
            },
            CommandSpec {
                name: "set-channel",
                description: "Set the channel for status messages",
                options: vec![CommandOption {
                    name: "channel",
                    description: "Channel to post status messages in",
                    kind: OptionKind::Channel,
                    required: true,
                    autocomplete: false,
                }],
            },
            CommandSpec {
                name: "set-title",
                description: "Set the status message title",
                options: vec![text("title", "New title", false)],
            },
            CommandSpec {
                name: "config",
                description: "Show this server's status configuration",
                options: Vec::new(),
            },
        ]
    }

    /// An empty allow-list means every user may administer the relay.
    fn is_admin(&self, user_id: &str) -> bool {
        self.admin_user_ids.is_empty() || self.admin_user_ids.iter().any(|id| id == user_id)
    }

    pub async fn handle(&self, ctx: &CommandContext, command: Command) -> Reply {
        if !self.is_admin(&ctx.user_id) {
            return Reply::error("You are not allowed to manage the status relay.");
        }
        info!(tenant = %ctx.tenant_id, user = %ctx.user_id, command = ?command, "Handling command");

        match command {
            Command::Track { monitor_id } => self.track(&ctx.tenant_id, monitor_id),
            Command::Untrack { monitor_id } => self.untrack(&ctx.tenant_id, monitor_id),
            Command::TrackAll => {
                self.store.track_all(&ctx.tenant_id);
                Reply::success("Now showing **all** monitors.")
            }
            Command::GroupCreate { name } => {
                if self.store.create_group(&ctx.tenant_id, &name) {
                    Reply::success(format!("Created group **{name}**."))
                } else {
                    Reply::error(format!("A group named **{name}** already exists."))
                }
            }
            Command::GroupDelete { name } => {
                if self.store.delete_group(&ctx.tenant_id, &name) {
                    Reply::removal(format!(
                        "Deleted group **{name}**. Its monitors are still tracked."
                    ))
                } else {
                    Reply::error(format!("No group named **{name}**."))
                }
            }
            Command::GroupAssign { group, monitor_id } => {
                self.assign(&ctx.tenant_id, &group, monitor_id)
            }
            Command::GroupUnassign { monitor_id } => {
                let label = self.monitor_label(monitor_id);
                if self.store.unassign_monitor(&ctx.tenant_id, monitor_id) {
                    Reply::removal(format!("Removed **{label}** from its group."))
                } else {
                    Reply::info(format!("**{label}** is not in any group."))
                }
            }
            Command::Groups => self.list_groups(&ctx.tenant_id),
            Command::SetChannel { channel_id } => {
                self.set_channel(&ctx.tenant_id, &channel_id).await
            }
            Command::SetTitle { title } => {
                self.store.set_status_title(&ctx.tenant_id, &title);
                Reply::success(format!("Status title set to **{title}**."))
            }
            Command::ShowConfig => self.show_config(&ctx.tenant_id),
        }
    }

    fn track(&self, tenant_id: &str, monitor_id: i64) -> Reply {
        let label = self.monitor_label(monitor_id);
        if self.store.track_monitor(tenant_id, monitor_id) {
            Reply::success(format!("Now tracking **{label}**."))
        } else {
            Reply::info(format!("**{label}** is already tracked."))
        }
    }

    fn untrack(&self, tenant_id: &str, monitor_id: i64) -> Reply {
        let label = self.monitor_label(monitor_id);
        if self.store.untrack_monitor(tenant_id, monitor_id) {
            Reply::removal(format!("Stopped tracking **{label}**."))
        } else {
            Reply::info(format!("**{label}** was not tracked."))
        }
    }

    fn assign(&self, tenant_id: &str, group: &str, monitor_id: i64) -> Reply {
        let label = self.monitor_label(monitor_id);
        let group_exists = self
            .store
            .view(tenant_id)
            .groups
            .iter()
            .any(|g| g.name.eq_ignore_ascii_case(group));
        if !group_exists {
            return Reply::error(format!("No group named **{group}**."));
        }
        if self.store.assign_to_group(tenant_id, group, monitor_id) {
            Reply::success(format!("Added **{label}** to **{group}**."))
        } else {
            Reply::info(format!("**{label}** is already in **{group}**."))
        }
    }

    fn list_groups(&self, tenant_id: &str) -> Reply {
        let tenant = self.store.view(tenant_id);
        if tenant.groups.is_empty() {
            return Reply::info("No groups defined.");
        }
        let mut lines = Vec::with_capacity(tenant.groups.len());
        for group in &tenant.groups {
            let members: Vec<String> = group
                .monitor_ids
                .iter()
                .map(|id| self.monitor_label(*id))
                .collect();
            if members.is_empty() {
                lines.push(format!("**{}**: (empty)", group.name));
            } else {
                lines.push(format!("**{}**: {}", group.name, members.join(", ")));
            }
        }
        Reply::info(lines.join("\n"))
    }

    async fn set_channel(&self, tenant_id: &str, channel_id: &str) -> Reply {
        match self.gateway.channel_exists(channel_id).await {
            Ok(true) => {
                self.store.set_channel(tenant_id, channel_id);
                Reply::success(
                    "Status channel updated. Messages will be recreated there shortly.",
                )
            }
            Ok(false) => Reply::error("I cannot see that channel."),
            Err(e) => Reply::error(format!("Could not verify the channel: {e}")),
        }
    }

    fn show_config(&self, tenant_id: &str) -> Reply {
        let tenant = self.store.view(tenant_id);
        let channel = tenant.channel_id.as_deref().unwrap_or("(not set)");
        let tracked = if tenant.monitor_ids.is_empty() {
            "all monitors".to_string()
        } else if tenant.monitor_ids.len() <= 10 {
            let names: Vec<String> = tenant
                .monitor_ids
                .iter()
                .map(|id| self.monitor_label(*id))
                .collect();
            names.join(", ")
        } else {
            format!("{} monitors", tenant.monitor_ids.len())
        };
        let groups = if tenant.groups.is_empty() {
            "(none)".to_string()
        } else {
            tenant
                .groups
                .iter()
                .map(|g| g.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let source = if self.connection.is_connected() {
            "connected"
        } else {
            "disconnected"
        };
        Reply::info(format!(
            "**Channel:** {channel}\n\
             **Title:** {}\n\
             **Update interval:** {}s\n\
             **Tracking:** {tracked}\n\
             **Groups:** {groups}\n\
             **Event source:** {source}",
            tenant.status_title, tenant.update_interval_secs,
        ))
    }

    fn monitor_label(&self, monitor_id: i64) -> String {
        self.cache
            .monitor_name(monitor_id)
            .unwrap_or_else(|| format!("ID {monitor_id}"))
    }

    /// Autocomplete for monitor-typed options: case-insensitive substring
    /// match over cached monitor names or ids, capped at the platform limit.
    pub fn autocomplete_monitors(&self, partial: &str) -> Vec<AutocompleteChoice> {
        let needle = partial.to_lowercase();
        let mut choices: Vec<AutocompleteChoice> = self
            .cache
            .all_monitors()
            .into_iter()
            .filter(|m| {
                needle.is_empty()
                    || m.name.to_lowercase().contains(&needle)
                    || m.id.to_string().contains(&needle)
            })
            .map(|m| AutocompleteChoice {
                name: m.name,
                value: m.id.to_string(),
            })
            .collect();
        choices.sort_by(|a, b| a.name.cmp(&b.name));
        choices.truncate(MAX_AUTOCOMPLETE_CHOICES);
        choices
    }

    /// Autocomplete for group-typed options. Falls back to the full list
    /// when nothing matches so a typo still shows what exists.
    pub fn autocomplete_groups(&self, tenant_id: &str, partial: &str) -> Vec<AutocompleteChoice> {
        let tenant = self.store.view(tenant_id);
        let needle = partial.to_lowercase();
        let choice = |name: &str| AutocompleteChoice {
            name: name.to_string(),
            value: name.to_string(),
        };
        let mut matches: Vec<AutocompleteChoice> = tenant
            .groups
            .iter()
            .filter(|g| g.name.to_lowercase().contains(&needle))
            .map(|g| choice(&g.name))
            .collect();
        if matches.is_empty() {
            matches = tenant.groups.iter().map(|g| choice(&g.name)).collect();
        }
        matches.truncate(MAX_AUTOCOMPLETE_CHOICES);
        matches
    }
}
