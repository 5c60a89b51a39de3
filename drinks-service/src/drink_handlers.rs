use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    Json,
};
use common_auth::AuthContext;
use common_http_errors::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::AppState;
use crate::config::Compatibility;
use crate::drink::{Drink, LongDrink, Recipe, RecipeError, RecipeInput, ShortDrink};
use crate::metrics::record_write;
use crate::repo::StorageError;

/// Body accepted by create and update. Both fields are optional on the wire.
#[derive(Debug, Default, Deserialize)]
pub struct DrinkPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub recipe: Option<RecipeInput>,
}

impl DrinkPayload {
    fn usable_title(&self) -> Option<&str> {
        self.title.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DrinksResponse<T> {
    pub success: bool,
    pub drinks: Vec<T>,
}

impl<T> DrinksResponse<T> {
    fn ok(drinks: Vec<T>) -> Json<Self> {
        Json(Self { success: true, drinks })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub success: bool,
    pub id: i32,
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::internal(err)
    }
}

impl From<RecipeError> for ApiError {
    fn from(err: RecipeError) -> Self {
        ApiError::internal(err)
    }
}

fn write_failed(op: &'static str, err: StorageError) -> ApiError {
    record_write(op, false);
    match err {
        StorageError::Missing(id) => {
            warn!(op, drink_id = id, "drink vanished during write");
            ApiError::not_found("drink_not_found")
        }
        other => {
            warn!(op, error = %other, "drink write rolled back");
            ApiError::unprocessable("drink_write_failed")
        }
    }
}

async fn load_drink(state: &AppState, id: i32) -> ApiResult<Drink> {
    state
        .repo()
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("drink_not_found"))
}

/// Drinks to echo after a write: the written row, or every row sharing its title in legacy mode.
async fn written_drinks(state: &AppState, id: i32, title: &str) -> ApiResult<Vec<LongDrink>> {
    let rows = match state.compat() {
        Compatibility::Corrected => vec![load_drink(state, id).await?],
        Compatibility::Legacy => state.repo().find_by_title(title).await?,
    };
    Ok(rows.iter().map(Drink::long).collect::<Result<Vec<_>, _>>()?)
}

pub async fn list_drinks(State(state): State<AppState>) -> ApiResult<Json<DrinksResponse<ShortDrink>>> {
    let rows = state.repo().list_all().await?;
    if rows.is_empty() {
        return Err(ApiError::not_found("drinks_not_found"));
    }
    let drinks = rows.iter().map(Drink::short).collect::<Result<Vec<_>, _>>()?;
    Ok(DrinksResponse::ok(drinks))
}

pub async fn list_drinks_detail(State(state): State<AppState>) -> ApiResult<Json<DrinksResponse<LongDrink>>> {
    let rows = state.repo().list_all().await?;
    if rows.is_empty() {
        return Err(match state.compat() {
            Compatibility::Corrected => ApiError::not_found("drinks_not_found"),
            Compatibility::Legacy => ApiError::Unauthorized {
                code: "drinks_not_found",
                message: "Unauthorized".into(),
            },
        });
    }
    let drinks = rows.iter().map(Drink::long).collect::<Result<Vec<_>, _>>()?;
    Ok(DrinksResponse::ok(drinks))
}

pub async fn create_drink(
    State(state): State<AppState>,
    auth: AuthContext,
    payload: Result<Json<DrinkPayload>, JsonRejection>,
) -> ApiResult<Json<DrinksResponse<LongDrink>>> {
    let Json(payload) = payload?;
    let title = payload
        .usable_title()
        .ok_or_else(|| ApiError::bad_request("title_required"))?
        .to_string();
    let recipe = payload.recipe.map(Recipe::from).unwrap_or_default();
    let encoded = recipe.encode()?;

    let id = state
        .repo()
        .insert(&title, &encoded)
        .await
        .map_err(|e| write_failed("create", e))?;
    record_write("create", true);
    info!(drink_id = id, subject = auth.subject(), "drink created");

    Ok(DrinksResponse::ok(written_drinks(&state, id, &title).await?))
}

pub async fn update_drink(
    State(state): State<AppState>,
    auth: AuthContext,
    path: Result<Path<i32>, PathRejection>,
    payload: Result<Json<DrinkPayload>, JsonRejection>,
) -> ApiResult<Json<DrinksResponse<LongDrink>>> {
    let Path(id) = path?;
    let mut drink = load_drink(&state, id).await?;
    let Json(payload) = payload?;

    let title = payload.usable_title().map(str::to_string);
    let recipe = payload.recipe.map(Recipe::from).filter(|r| !r.is_empty());
    if title.is_none() && recipe.is_none() {
        return Err(ApiError::bad_request("no_updatable_fields"));
    }
    if let Some(title) = title {
        drink.title = title;
    }
    if let Some(recipe) = recipe {
        drink.recipe = recipe.encode()?;
    }

    state
        .repo()
        .update(&drink)
        .await
        .map_err(|e| write_failed("update", e))?;
    record_write("update", true);
    info!(drink_id = id, subject = auth.subject(), "drink updated");

    Ok(DrinksResponse::ok(written_drinks(&state, id, &drink.title).await?))
}

pub async fn delete_drink(
    State(state): State<AppState>,
    auth: AuthContext,
    path: Result<Path<i32>, PathRejection>,
) -> ApiResult<Json<DeletedResponse>> {
    let Path(id) = path?;
    let drink = load_drink(&state, id).await?;
    state
        .repo()
        .delete(&drink)
        .await
        .map_err(|e| write_failed("delete", e))?;
    record_write("delete", true);
    info!(drink_id = id, subject = auth.subject(), "drink deleted");
    Ok(Json(DeletedResponse { success: true, id }))
}
