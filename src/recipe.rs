//! Recipe data consumed by a cooking session
//!
//! Recipes are loaded and persisted elsewhere; a session only reads them.

use serde::{Deserialize, Serialize};

/// A single ingredient line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    /// Ingredient name (e.g., "flour")
    pub name: String,
    /// Amount as written by the recipe author (e.g., "2", "1/2")
    pub quantity: String,
    /// Unit of measure (e.g., "cups", "g")
    pub unit: String,
}

impl Ingredient {
    pub fn new(
        name: impl Into<String>,
        quantity: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            quantity: quantity.into(),
            unit: unit.into(),
        }
    }

    /// Spoken form: "{quantity} {unit} of {name}"
    pub fn spoken(&self) -> String {
        format!("{} {} of {}", self.quantity, self.unit, self.name)
    }
}

/// The read-only recipe a cooking session walks through
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recipe {
    /// Ordered instruction steps
    pub instructions: Vec<String>,
    /// Ordered ingredient list
    pub ingredients: Vec<Ingredient>,
    /// Tips shown in the tips drawer
    pub tips: Vec<String>,
}

impl Recipe {
    pub fn new(instructions: Vec<String>, ingredients: Vec<Ingredient>) -> Self {
        Self {
            instructions,
            ingredients,
            tips: Vec::new(),
        }
    }

    /// Number of instruction steps
    pub fn step_count(&self) -> usize {
        self.instructions.len()
    }

    /// Instruction text at `index`, if any
    pub fn instruction(&self, index: usize) -> Option<&str> {
        self.instructions.get(index).map(String::as_str)
    }

    /// Sentence read aloud for the ingredients command
    ///
    /// Every ingredient is rendered as "{quantity} {unit} of {name}" and the
    /// lines are joined with ". ".
    pub fn ingredients_sentence(&self) -> String {
        let lines: Vec<String> = self.ingredients.iter().map(Ingredient::spoken).collect();
        format!("You need: {}", lines.join(". "))
    }
}
