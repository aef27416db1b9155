//! Framework listing with live comparison progress.

use chrono::{DateTime, Utc};
use dioxus::prelude::*;
use frameworks_shared::{ConnectionStatus, SortOrder};
use serde::Deserialize;
use serde_json::json;

use crate::api_client::ApiClient;
use crate::config::ClientConfig;
use crate::realtime::{use_job_tracker, use_realtime, JobPhase, JobTracker};
use crate::stores::{
    dismiss_notification, push_error, push_notification, NotificationLevel, NOTIFICATIONS,
};
use crate::table::{use_debounced_search, use_remote_table};

const COMPARISON_FEATURE: &str = "comparison";
const COLUMNS: [(&str, &str); 3] = [("name", "Name"), ("status", "Status"), ("createdAt", "Uploaded")];
const PAGE_SIZES: [u32; 3] = [10, 25, 50];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkRow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[component]
pub fn FrameworksView() -> Element {
    let config = use_context::<ClientConfig>();
    let api = use_hook(|| ApiClient::from_config(&config));
    let table = use_remote_table(
        api.endpoint::<FrameworkRow>("/api/frameworks"),
        config.table().with_empty_message("No frameworks uploaded yet"),
    );
    let mut search = use_debounced_search(&table);
    let comparison = use_job_tracker(COMPARISON_FEATURE);

    // A finished comparison updates framework statuses.
    let refresh = table.clone();
    use_effect(move || {
        if comparison.read().phase == JobPhase::Completed {
            refresh.refetch();
        }
    });

    let snapshot = table.state.read().clone();
    let query = snapshot.query.clone();
    let pagination = snapshot.pagination;
    let comparing = comparison.read().is_processing();

    let headers = COLUMNS.iter().map(|&(key, label)| {
        let table = table.clone();
        let arrow = match (query.sort_by == key, query.sort_order) {
            (true, SortOrder::Asc) => " ▲",
            (true, SortOrder::Desc) => " ▼",
            (false, _) => "",
        };
        rsx! {
            th { key: "{key}", onclick: move |_| table.handle_sort(key), "{label}{arrow}" }
        }
    });

    let rows = snapshot.data.iter().map(|row| {
        let api = api.clone();
        let id = row.id.clone();
        let uploaded = row
            .created_at
            .map(|at| at.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        rsx! {
            tr { key: "{row.id}",
                td { "{row.name}" }
                td { "{row.status}" }
                td { "{uploaded}" }
                td {
                    button {
                        disabled: comparing,
                        onclick: move |_| {
                            let api = api.clone();
                            let id = id.clone();
                            spawn(async move {
                                let body = json!({ "frameworkId": id });
                                match api.post_json::<_, serde_json::Value>("/api/comparisons", &body).await {
                                    Ok(_) => {
                                        push_notification(NotificationLevel::Info, "Comparison started");
                                    }
                                    Err(e) => {
                                        push_error(e.to_string());
                                    }
                                }
                            });
                        },
                        "Compare"
                    }
                }
            }
        }
    });

    let search_text = search.input.read().clone();
    let flush = search.clone();
    let status_filter = table.clone();
    let page_size = table.clone();
    let prev = table.clone();
    let next = table.clone();

    rsx! {
        div { class: "frameworks-page",
            header { class: "frameworks-header",
                h1 { "Frameworks" }
                ConnectionBadge {}
            }
            JobBanner { job: comparison.read().clone() }
            div { class: "frameworks-toolbar",
                input {
                    r#type: "search",
                    placeholder: "Search frameworks",
                    value: "{search_text}",
                    oninput: move |evt: FormEvent| search.set(evt.value()),
                    onkeydown: move |evt: KeyboardEvent| {
                        if evt.key() == Key::Enter {
                            flush.flush();
                        }
                    },
                }
                select {
                    onchange: move |evt: FormEvent| status_filter.handle_filter_change("status", &evt.value()),
                    option { value: "", "All statuses" }
                    option { value: "pending", "Pending" }
                    option { value: "approved", "Approved" }
                    option { value: "rejected", "Rejected" }
                }
                select {
                    onchange: move |evt: FormEvent| {
                        if let Ok(limit) = evt.value().parse() {
                            page_size.handle_limit_change(limit);
                        }
                    },
                    for size in PAGE_SIZES {
                        option { value: "{size}", selected: size == query.limit, "{size} per page" }
                    }
                }
            }
            table { class: "frameworks-table",
                thead {
                    tr {
                        {headers}
                        th {}
                    }
                }
                tbody {
                    if snapshot.loading {
                        tr { td { colspan: "4", "Loading..." } }
                    } else if snapshot.data.is_empty() {
                        tr { td { colspan: "4", "{snapshot.empty_message}" } }
                    } else {
                        {rows}
                    }
                }
            }
            footer { class: "frameworks-pagination",
                button {
                    disabled: !pagination.has_prev_page,
                    onclick: move |_| prev.handle_page_change(pagination.current_page.saturating_sub(1).max(1)),
                    "Previous"
                }
                span { "Page {pagination.current_page} of {pagination.total_pages} ({pagination.total_items} total)" }
                button {
                    disabled: !pagination.has_next_page,
                    onclick: move |_| next.handle_page_change(pagination.current_page + 1),
                    "Next"
                }
            }
            NotificationList {}
        }
    }
}

#[component]
fn ConnectionBadge() -> Element {
    let realtime = use_realtime();
    let config = use_context::<ClientConfig>();

    let status = realtime.status.read().clone();
    let label = match status {
        ConnectionStatus::Connected => "Live",
        ConnectionStatus::Connecting => "Connecting...",
        ConnectionStatus::Error => "Offline",
        _ => "Disconnected",
    };
    let retry_token = config
        .token
        .clone()
        .filter(|_| matches!(status, ConnectionStatus::Disconnected | ConnectionStatus::Error));
    let last_error = realtime
        .last_error
        .read()
        .as_ref()
        .map(|e| e.to_string())
        .unwrap_or_default();

    rsx! {
        span { class: "connection-badge", title: "{last_error}",
            "{label}"
            if let Some(token) = retry_token {
                button { onclick: move |_| realtime.connect(token.clone()), "Reconnect" }
            }
        }
    }
}

#[component]
fn JobBanner(job: JobTracker) -> Element {
    match job.phase {
        JobPhase::Idle => rsx! {},
        JobPhase::Processing => {
            let progress = job.progress.map(|p| format!(" {p:.0}%")).unwrap_or_default();
            rsx! {
                div { class: "job-banner processing", "Comparing frameworks...{progress}" }
            }
        }
        JobPhase::Completed => rsx! {
            div { class: "job-banner completed", "Comparison finished: {job.count} matched controls" }
        },
        JobPhase::Error => {
            let message = job.message.clone().unwrap_or_default();
            rsx! {
                div { class: "job-banner error", "{message}" }
            }
        }
    }
}

#[component]
fn NotificationList() -> Element {
    let notifications = NOTIFICATIONS.read().clone();

    rsx! {
        ul { class: "notifications",
            for notification in notifications {
                li { key: "{notification.id}", class: notification.level.class_name(),
                    "{notification.message}"
                    button { onclick: move |_| dismiss_notification(notification.id), "×" }
                }
            }
        }
    }
}
