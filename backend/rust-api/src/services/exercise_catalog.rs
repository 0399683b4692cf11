use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::{Collection, Database};

use crate::metrics::track_db_operation;
use crate::models::Exercise;

pub const EXERCISES_COLLECTION: &str = "training_exercises";

/// Read-only lookup of exercise definitions.
#[async_trait]
pub trait ExerciseCatalog: Send + Sync {
    async fn find_exercise(&self, exercise_id: &str) -> Result<Option<Exercise>>;
}

pub struct MongoExerciseCatalog {
    collection: Collection<Exercise>,
}

impl MongoExerciseCatalog {
    pub fn new(mongo: Database) -> Self {
        Self {
            collection: mongo.collection::<Exercise>(EXERCISES_COLLECTION),
        }
    }
}

#[async_trait]
impl ExerciseCatalog for MongoExerciseCatalog {
    async fn find_exercise(&self, exercise_id: &str) -> Result<Option<Exercise>> {
        track_db_operation("find_one", EXERCISES_COLLECTION, async {
            self.collection
                .find_one(doc! { "_id": exercise_id })
                .await
                .context("Failed to query exercise")
        })
        .await
    }
}

#[derive(Default)]
pub struct MemoryExerciseCatalog {
    exercises: RwLock<HashMap<String, Exercise>>,
}

impl MemoryExerciseCatalog {
    pub fn with_exercises(exercises: impl IntoIterator<Item = Exercise>) -> Self {
        let catalog = Self::default();
        for exercise in exercises {
            catalog.insert(exercise);
        }
        catalog
    }

    pub fn insert(&self, exercise: Exercise) {
        self.exercises
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(exercise.id.clone(), exercise);
    }
}

#[async_trait]
impl ExerciseCatalog for MemoryExerciseCatalog {
    async fn find_exercise(&self, exercise_id: &str) -> Result<Option<Exercise>> {
        Ok(self
            .exercises
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(exercise_id)
            .cloned())
    }
}
