//! GraphQL Subgraph Routes
//!
//! Federated schema for saved-item annotations. `SavedItem` is an entity
//! keyed by `id`; this subgraph contributes its `annotations` field and owns
//! the `Highlight` and `HighlightNote` types and their mutations.
//!
//! Endpoints:
//! - POST /graphql - Execute queries and mutations
//! - POST / - Same, for gateways that post to the root
//! - GET /graphql - GraphiQL playground (outside production)

use async_graphql::{
    Context, EmptySubscription, ErrorExtensions, InputObject, Object, Result as GqlResult,
    ResultExt, Schema, SimpleObject, ID,
};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    extract::State,
    http::HeaderMap,
    response::{Html, IntoResponse},
    routing::{get, post},
    Router,
};

use crate::{
    context::RequestContext,
    error::{ApiError, ApiResult},
    repositories::NoteRepository,
    state::AppState,
    types::{self, HighlightRecord, NewHighlight, NewNote, NoteRecord},
};

// ============================================================================
// GRAPHQL TYPES
// ============================================================================

/// A highlighted passage on a saved item.
pub struct Highlight(HighlightRecord);

#[Object]
impl Highlight {
    async fn id(&self) -> ID {
        ID(self.0.id.clone())
    }

    async fn quote(&self) -> &str {
        &self.0.quote
    }

    async fn patch(&self) -> &str {
        &self.0.patch
    }

    async fn version(&self) -> i32 {
        self.0.version
    }

    #[graphql(name = "_createdAt")]
    async fn created_at(&self) -> i64 {
        self.0.created_at.timestamp()
    }

    #[graphql(name = "_updatedAt")]
    async fn updated_at(&self) -> i64 {
        self.0.updated_at.timestamp()
    }

    /// Premium only. Loaded in one batch with every other note in the
    /// operation.
    async fn note(&self, ctx: &Context<'_>) -> GqlResult<Option<HighlightNote>> {
        let rc = ctx.data::<RequestContext>()?;
        let loader = rc.notes_loader().extend()?;
        let note = loader.load(&self.0.id).await.extend()?;
        Ok(note.map(HighlightNote::from))
    }
}

/// A note attached to a highlight.
#[derive(Debug, Clone, PartialEq, SimpleObject)]
pub struct HighlightNote {
    pub highlight_id: ID,
    pub text: String,
    #[graphql(name = "_createdAt")]
    pub created_at: i64,
    #[graphql(name = "_updatedAt")]
    pub updated_at: i64,
}

impl From<NoteRecord> for HighlightNote {
    fn from(note: NoteRecord) -> Self {
        Self {
            highlight_id: ID(note.highlight_id),
            text: note.text,
            created_at: note.created_at,
            updated_at: note.updated_at,
        }
    }
}

#[derive(SimpleObject)]
pub struct SavedItemAnnotations {
    pub highlights: Vec<Highlight>,
}

/// A saved item, owned by another subgraph.
pub struct SavedItem {
    id: ID,
}

#[Object]
impl SavedItem {
    async fn id(&self) -> &ID {
        &self.id
    }

    /// The caller's active highlights on this item.
    async fn annotations(&self, ctx: &Context<'_>) -> GqlResult<SavedItemAnnotations> {
        let rc = ctx.data::<RequestContext>()?;
        let highlights = rc.highlights().extend()?;
        let item_id = parse_item_id(&self.id).extend()?;
        let records = highlights.get_highlights_by_item_id(item_id).await.extend()?;
        Ok(SavedItemAnnotations {
            highlights: records.into_iter().map(Highlight).collect(),
        })
    }
}

// ============================================================================
// INPUT TYPES
// ============================================================================

/// Input for creating a highlight, optionally with a note.
#[derive(Debug, Clone, InputObject)]
pub struct CreateHighlightInput {
    /// Client-chosen id; generated when absent.
    pub id: Option<ID>,
    pub item_id: ID,
    pub quote: String,
    pub patch: String,
    pub version: i32,
    pub note: Option<String>,
}

impl CreateHighlightInput {
    fn into_new_highlight(self) -> ApiResult<NewHighlight> {
        Ok(NewHighlight {
            id: self.id.map(|id| id.0).filter(|id| !id.trim().is_empty()),
            input: highlight_fields(&self.item_id, self.quote, self.patch, self.version)?,
            note: self.note.filter(|note| !note.trim().is_empty()),
        })
    }
}

/// Input for updating a highlight.
#[derive(Debug, Clone, InputObject)]
pub struct HighlightInput {
    pub item_id: ID,
    pub quote: String,
    pub patch: String,
    pub version: i32,
}

impl HighlightInput {
    fn into_fields(self) -> ApiResult<types::HighlightInput> {
        highlight_fields(&self.item_id, self.quote, self.patch, self.version)
    }
}

fn parse_item_id(id: &ID) -> ApiResult<i64> {
    id.parse::<i64>()
        .map_err(|_| ApiError::bad_user_input(format!("Invalid itemId: {}", id.as_str())))
}

fn highlight_fields(
    item_id: &ID,
    quote: String,
    patch: String,
    version: i32,
) -> ApiResult<types::HighlightInput> {
    if version < 1 {
        return Err(ApiError::bad_user_input("version must be a positive integer"));
    }
    Ok(types::HighlightInput {
        item_id: parse_item_id(item_id)?,
        quote,
        patch,
        version,
    })
}

// ============================================================================
// QUERY ROOT
// ============================================================================

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    #[graphql(entity)]
    async fn find_saved_item_by_id(&self, #[graphql(key)] id: ID) -> SavedItem {
        SavedItem { id }
    }
}

// ============================================================================
// MUTATION ROOT
// ============================================================================

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Create highlights in one transaction. Notes supplied with them are
    /// written afterwards in one batch; if that fails the notes and the new
    /// highlights are discarded again.
    async fn create_saved_item_highlights(
        &self,
        ctx: &Context<'_>,
        input: Vec<CreateHighlightInput>,
    ) -> GqlResult<Vec<Highlight>> {
        let rc = ctx.data::<RequestContext>()?;
        let highlights = rc.highlights().extend()?;
        let inputs = input
            .into_iter()
            .map(CreateHighlightInput::into_new_highlight)
            .collect::<ApiResult<Vec<_>>>()
            .extend()?;

        let notes = if inputs.iter().any(|h| h.note.is_some()) {
            Some(rc.notes().extend()?)
        } else {
            None
        };

        let created = highlights.create_highlight(&inputs).await.extend()?;

        if let Some(notes) = notes {
            let pending: Vec<NewNote> = created
                .iter()
                .zip(&inputs)
                .filter_map(|(record, input)| {
                    input.note.as_ref().map(|text| NewNote {
                        highlight_id: record.id.clone(),
                        text: text.clone(),
                    })
                })
                .collect();

            let note_ids: Vec<String> = pending.iter().map(|n| n.highlight_id.clone()).collect();
            match notes.batch_create(pending).await {
                Ok(written) => {
                    if let Ok(loader) = rc.notes_loader() {
                        loader.prime(written).await;
                    }
                }
                Err(err) => {
                    // Earlier chunks of the batch may have landed.
                    if let Err(undo) = notes.discard(&note_ids).await {
                        tracing::error!(
                            error = %undo,
                            highlight_ids = ?note_ids,
                            "Failed to discard notes after note write failure"
                        );
                    }
                    let ids: Vec<String> = created.iter().map(|r| r.id.clone()).collect();
                    if let Err(undo) = highlights.discard_created(&ids).await {
                        tracing::error!(
                            error = %undo,
                            highlight_ids = ?ids,
                            "Failed to discard highlights after note write failure"
                        );
                    }
                    return Err(err.extend());
                }
            }
        }

        Ok(created.into_iter().map(Highlight).collect())
    }

    async fn update_saved_item_highlight(
        &self,
        ctx: &Context<'_>,
        id: ID,
        input: HighlightInput,
    ) -> GqlResult<Highlight> {
        let rc = ctx.data::<RequestContext>()?;
        let highlights = rc.highlights().extend()?;
        let fields = input.into_fields().extend()?;
        let updated = highlights
            .update_highlights_by_id(&id, &fields)
            .await
            .extend()?;
        Ok(Highlight(updated))
    }

    async fn delete_saved_item_highlight(&self, ctx: &Context<'_>, id: ID) -> GqlResult<ID> {
        let rc = ctx.data::<RequestContext>()?;
        let deleted = rc
            .highlights()
            .extend()?
            .delete_highlight_by_id(&id)
            .await
            .extend()?;
        Ok(ID(deleted))
    }

    async fn create_saved_item_highlight_note(
        &self,
        ctx: &Context<'_>,
        id: ID,
        input: String,
    ) -> GqlResult<Option<HighlightNote>> {
        let rc = ctx.data::<RequestContext>()?;
        let notes = note_target(rc, &id).await.extend()?;
        let note = notes.create(&id, &input).await.extend()?;
        Ok(Some(note.into()))
    }

    async fn update_saved_item_highlight_note(
        &self,
        ctx: &Context<'_>,
        id: ID,
        input: String,
    ) -> GqlResult<Option<HighlightNote>> {
        let rc = ctx.data::<RequestContext>()?;
        let notes = note_target(rc, &id).await.extend()?;
        let note = notes.upsert(&id, &input).await.extend()?;
        Ok(Some(note.into()))
    }

    async fn delete_saved_item_highlight_note(
        &self,
        ctx: &Context<'_>,
        id: ID,
    ) -> GqlResult<Option<ID>> {
        let rc = ctx.data::<RequestContext>()?;
        let notes = note_target(rc, &id).await.extend()?;
        let deleted = notes.delete(&id).await.extend()?;
        Ok(Some(ID(deleted)))
    }
}

/// Premium gate, then ownership of the highlight the note hangs off.
async fn note_target(rc: &RequestContext, highlight_id: &str) -> ApiResult<NoteRepository> {
    let notes = rc.notes()?;
    rc.highlights()?.get_highlight_by_id(highlight_id).await?;
    Ok(notes)
}

// ============================================================================
// SCHEMA & HANDLERS
// ============================================================================

/// The GraphQL schema type.
pub type AnnotationsSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Create the federated schema.
pub fn create_schema() -> AnnotationsSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .enable_federation()
        .finish()
}

#[derive(Clone)]
pub struct GraphQlState {
    schema: AnnotationsSchema,
    app: AppState,
}

/// Handler for GraphQL requests.
pub async fn graphql_handler(
    State(state): State<GraphQlState>,
    headers: HeaderMap,
    req: GraphQLRequest,
) -> GraphQLResponse {
    let context = RequestContext::from_headers(
        &headers,
        state.app.db.clone(),
        state.app.notes.clone(),
        state.app.config.basic_highlight_limit,
    );
    let request = req.into_inner().data(context);
    state.schema.execute(request).await.into()
}

/// Handler for GraphiQL playground.
pub async fn graphiql_handler() -> impl IntoResponse {
    Html(
        async_graphql::http::GraphiQLSource::build()
            .endpoint("/graphql")
            .finish(),
    )
}

// ============================================================================
// ROUTER SETUP
// ============================================================================

/// Create the GraphQL routes router.
pub fn create_router(app: AppState) -> Router {
    let graphiql = app.config.graphiql_enabled();
    let state = GraphQlState {
        schema: create_schema(),
        app,
    };

    let endpoint = if graphiql {
        get(graphiql_handler).post(graphql_handler)
    } else {
        post(graphql_handler)
    };

    Router::new()
        .route("/graphql", endpoint)
        .route("/", post(graphql_handler))
        .with_state(state)
}
