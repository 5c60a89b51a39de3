use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("failed to encode recipe: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("stored recipe for drink {id} is not a list of ingredients: {source}")]
    Corrupt {
        id: i32,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    pub color: String,
    pub parts: u32,
}

/// Ingredient with its name withheld, as shown on the public menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortIngredient {
    pub color: String,
    pub parts: u32,
}

impl From<&Ingredient> for ShortIngredient {
    fn from(ingredient: &Ingredient) -> Self {
        Self { color: ingredient.color.clone(), parts: ingredient.parts }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Recipe(pub Vec<Ingredient>);

impl Recipe {
    /// Text form kept in the `recipe` column.
    pub fn encode(&self) -> Result<String, RecipeError> {
        serde_json::to_string(&self.0).map_err(RecipeError::Encode)
    }

    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Vec<Ingredient>>(raw).map(Recipe)
    }

    pub fn ingredients(&self) -> &[Ingredient] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Request-side recipe: clients send either a list of ingredients or a single one.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RecipeInput {
    Many(Vec<Ingredient>),
    One(Ingredient),
}

impl From<RecipeInput> for Recipe {
    fn from(input: RecipeInput) -> Self {
        match input {
            RecipeInput::Many(items) => Recipe(items),
            RecipeInput::One(item) => Recipe(vec![item]),
        }
    }
}

/// A persisted drink row; `recipe` holds the encoded ingredient list.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Drink {
    pub id: i32,
    pub title: String,
    pub recipe: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortDrink {
    pub id: i32,
    pub title: String,
    pub recipe: Vec<ShortIngredient>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LongDrink {
    pub id: i32,
    pub title: String,
    pub recipe: Vec<Ingredient>,
}

impl Drink {
    pub fn recipe(&self) -> Result<Recipe, RecipeError> {
        Recipe::decode(&self.recipe).map_err(|source| RecipeError::Corrupt { id: self.id, source })
    }

    pub fn short(&self) -> Result<ShortDrink, RecipeError> {
        let recipe = self.recipe()?;
        Ok(ShortDrink {
            id: self.id,
            title: self.title.clone(),
            recipe: recipe.ingredients().iter().map(ShortIngredient::from).collect(),
        })
    }

    pub fn long(&self) -> Result<LongDrink, RecipeError> {
        let recipe = self.recipe()?;
        Ok(LongDrink { id: self.id, title: self.title.clone(), recipe: recipe.0 })
    }
}
