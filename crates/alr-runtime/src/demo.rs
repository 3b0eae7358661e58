//! Scripted walk through one artifact's lifecycle

use alr_context::{CallContext, TerminalAction};
use alr_core::{ArtifactTypeId, CallMeta, Document, StateId, UserId};
use alr_graph::State;
use alr_registry::{ArtifactBehavior, ArtifactFactory, BehaviorError, Operation};
use alr_runtime::{Runtime, RuntimeConfig, User};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub(crate) const CONFIG: &str = r#"
default_post_action = "touch"
sweep_interval_ms = 1000
background_timeout_ms = 5000

[[artifact_types]]
id = "report"
initial_state = "draft"
states = [{ id = "review", label = "In review" }, "published"]

[[artifact_types.transitions]]
from = "draft"
to = "review"
guard = { kind = "requires_field", field = "title" }

[[artifact_types.transitions]]
from = "review"
to = "draft"

[[artifact_types.transitions]]
from = "review"
to = "published"
guard = { kind = "field_equals", field = "approved", value = true }
"#;

struct Report;

#[async_trait]
impl ArtifactBehavior for Report {
    async fn advance(&self, op: Operation<'_>, _from: &State, to: &State) -> Result<(), BehaviorError> {
        if to.id().as_str() != "published" {
            return Ok(());
        }
        let (cell, ticket) = op.background();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cell.lock()
                .await
                .update_data(|data| data["published_at"] = json!(chrono::Utc::now().to_rfc3339()));
            ticket.messages().info("rendered and published");
            ticket.complete(TerminalAction::Persist);
        });
        Ok(())
    }

    async fn produce_output(
        &self,
        op: Operation<'_>,
        output_type: &str,
        format: &str,
    ) -> Result<Vec<u8>, BehaviorError> {
        match (output_type, format) {
            ("markdown", "text") => {
                let data = op.record.data();
                let title = data.get("title").and_then(Document::as_str).unwrap_or("untitled");
                let body = data.get("body").and_then(Document::as_str).unwrap_or("");
                Ok(format!("# {title}\n\n{body}\n").into_bytes())
            }
            _ => Err(BehaviorError::unsupported_output(output_type, format)),
        }
    }
}

struct ReportFactory {
    artifact_type: ArtifactTypeId,
}

#[async_trait]
impl ArtifactFactory for ReportFactory {
    fn name(&self) -> &str {
        "report"
    }

    fn artifact_type(&self) -> &ArtifactTypeId {
        &self.artifact_type
    }

    async fn create(&self, _context: &CallContext, _input: &Document) -> Result<Document, BehaviorError> {
        Ok(json!({}))
    }

    fn time_to_live_untouched(&self, _record: &alr_core::ArtifactRecord) -> Option<Duration> {
        Some(Duration::from_secs(600))
    }

    fn behavior(&self) -> Arc<dyn ArtifactBehavior> {
        Arc::new(Report)
    }
}

pub(crate) async fn run(config: RuntimeConfig) -> anyhow::Result<()> {
    let runtime = Runtime::builder(config)
        .factory(Arc::new(ReportFactory {
            artifact_type: ArtifactTypeId::from("report"),
        }))
        .build()?;
    let _sweeper = runtime.start_sweeper();

    let owner = UserId::from("demo");
    runtime.create_user(User::new(owner.clone(), ["editor"])).await;
    let meta = CallMeta::new().with_user(owner.clone());

    let (id, created) = runtime.create("report", &meta, &Document::Null).await?;
    println!("created {id} in {}", created.state);

    let review = StateId::from("review");
    if let Err(error) = runtime.advance(id, &review, &meta).await {
        println!("advance before feeding a title: {error}");
    }

    runtime
        .feed(id, json!({"title": "Quarterly", "body": "All green."}), &meta)
        .await?;
    let reviewed = runtime.advance(id, &review, &meta).await?;
    println!("now in {} (next: {:?})", reviewed.state, reviewed.reachable_states);

    for attempt in 1..=2 {
        let output = runtime.out(id, "markdown", "text", &meta).await?;
        println!("out #{attempt}: {} bytes, cached: {}", output.len(), output.from_cache());
    }

    runtime.feed(id, json!({"approved": true}), &meta).await?;
    let publishing = runtime.advance(id, &StateId::from("published"), &meta).await?;
    println!("publishing, in background: {}", publishing.in_background);

    loop {
        let described = runtime.describe(id, &Document::Null, &meta).await?;
        if !described.in_background {
            println!("published: {}", described.state);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    for message in runtime.drain_messages(id).await? {
        println!("message: {}", message.text);
    }

    let collection = runtime
        .create_collection(&owner, "published reports", serde_json::Map::new())
        .await?;
    runtime.add_item(collection.id(), id, json!({"pinned": true})).await?;
    let listing = runtime.collection_out(collection.id(), "items", "json").await?;
    let mut stdout = tokio::io::stdout();
    listing.write_to(&mut stdout).await?;
    println!();

    let final_state = runtime.describe(id, &Document::Null, &meta).await?;
    println!("{}", serde_json::to_string_pretty(&final_state)?);
    Ok(())
}
