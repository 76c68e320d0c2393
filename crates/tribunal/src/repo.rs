//! Solution persistence.
//!
//! The relational store lives behind [`SolutionRepo`]; the supervisor is its
//! only writer while a solution is being tested. [`MemoryRepo`] backs tests
//! and single-node local judging.

use async_trait::async_trait;
use chrono::Utc;

use crate::error::Error;
use crate::model::{
    Solution, SolutionCreation, SolutionUpdate, SolutionsFilter, SolutionsList,
    SolutionsListItem, State,
};

/// CRUD surface over stored solutions.
#[async_trait]
pub trait SolutionRepo: Send + Sync {
    async fn create_solution(&self, creation: &SolutionCreation) -> Result<i32, Error>;
    async fn get_solution(&self, id: i32) -> Result<Solution, Error>;
    async fn update_solution(&self, id: i32, update: &SolutionUpdate) -> Result<(), Error>;
    async fn list_solutions(&self, filter: &SolutionsFilter) -> Result<SolutionsList, Error>;
}

/// In-memory repository.
#[derive(Debug, Default)]
pub struct MemoryRepo {
    data: std::sync::Mutex<Vec<Solution>>,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SolutionRepo for MemoryRepo {
    async fn create_solution(&self, creation: &SolutionCreation) -> Result<i32, Error> {
        let mut data = self.data.lock().expect("memory repo lock poisoned");
        let id = data.len() as i32 + 1;
        let now = Utc::now();
        data.push(Solution {
            id,
            user_id: creation.user_id,
            username: creation.username.clone(),
            source: creation.source.clone(),
            state: State::Saved,
            score: 0,
            penalty: creation.penalty,
            time_stat: 0,
            memory_stat: 0,
            language: creation.language,
            problem_id: creation.problem_id,
            problem_title: creation.problem_title.clone(),
            position: creation.position,
            contest_id: creation.contest_id,
            contest_title: creation.contest_title.clone(),
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn get_solution(&self, id: i32) -> Result<Solution, Error> {
        let data = self.data.lock().expect("memory repo lock poisoned");
        data.iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("solution {id}")))
    }

    async fn update_solution(&self, id: i32, update: &SolutionUpdate) -> Result<(), Error> {
        let mut data = self.data.lock().expect("memory repo lock poisoned");
        let solution = data
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::not_found(format!("solution {id}")))?;
        solution.state = update.state;
        solution.score = update.score;
        solution.time_stat = update.time_stat;
        solution.memory_stat = update.memory_stat;
        solution.updated_at = Utc::now();
        Ok(())
    }

    async fn list_solutions(&self, filter: &SolutionsFilter) -> Result<SolutionsList, Error> {
        let data = self.data.lock().expect("memory repo lock poisoned");
        let mut matching: Vec<&Solution> = data
            .iter()
            .filter(|s| filter.contest_id.is_none_or(|id| s.contest_id == id))
            .filter(|s| filter.user_id.is_none_or(|id| s.user_id == id))
            .filter(|s| filter.problem_id.is_none_or(|id| s.problem_id == id))
            .filter(|s| filter.language.is_none_or(|lang| s.language == lang))
            .filter(|s| filter.state.is_none_or(|state| s.state == state))
            .collect();

        if filter.order.is_some_and(|order| order < 0) {
            matching.sort_by_key(|s| std::cmp::Reverse(s.id));
        } else {
            matching.sort_by_key(|s| s.id);
        }

        let total = matching.len();
        let offset = filter.offset().max(0) as usize;
        let page_size = filter.page_size.max(0) as usize;
        let solutions = matching
            .into_iter()
            .skip(offset)
            .take(if page_size == 0 { total } else { page_size })
            .map(SolutionsListItem::from)
            .collect();

        Ok(SolutionsList { solutions, total })
    }
}
