//! Task engine - task CRUD against the datastore
use log::{debug, info};
use std::sync::Arc;

use crate::datastore::{Client, Datastore, Key, Query};
use crate::tasks::error::TaskError;
use crate::tasks::types::{Task, TASK_KIND};

#[derive(Clone)]
pub struct TaskEngine {
    client: Client,
}

impl TaskEngine {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self::with_client(Client::new(store))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Stores a new open task and returns the id the datastore assigned.
    pub async fn create_task(&self, description: &str) -> Result<i64, TaskError> {
        let task = Task::new(description);
        let key = self.client.put(task.to_entity()).await?;
        let id = key
            .id
            .ok_or_else(|| TaskError::Internal("datastore returned an incomplete key".to_string()))?;
        info!("[TASKS] Created task {}", id);
        Ok(id)
    }

    pub async fn get_task(&self, id: i64) -> Result<Task, TaskError> {
        let entity = self.client.get(&Key::with_id(TASK_KIND, id)).await?;
        Ok(Task::from_entity(&entity)?)
    }

    /// Sets `done` inside a transaction. Returns `true` if this call changed
    /// the task, `false` if it was already done.
    pub async fn mark_done(&self, id: i64) -> Result<bool, TaskError> {
        let key = Key::with_id(TASK_KIND, id);
        let changed = self
            .client
            .run_in_transaction(|tx| {
                let key = key.clone();
                Box::pin(async move {
                    let mut task = Task::from_entity(&tx.get(&key).await?)?;
                    if task.done {
                        return Ok(false);
                    }
                    task.done = true;
                    tx.put(task.to_entity());
                    Ok(true)
                })
            })
            .await?;

        if changed {
            info!("[TASKS] Marked task {} done", id);
        } else {
            debug!("[TASKS] Task {} was already done", id);
        }
        Ok(changed)
    }

    /// Overwrites description and completion flag. Last writer wins.
    pub async fn update_task(
        &self,
        id: i64,
        description: &str,
        done: bool,
    ) -> Result<Task, TaskError> {
        let mut task = self.get_task(id).await?;
        task.description = description.to_string();
        task.done = done;
        self.client.put(task.to_entity()).await?;
        info!("[TASKS] Updated task {} (done={})", id, done);
        Ok(task)
    }

    /// All tasks, oldest first.
    pub async fn list_tasks(&self) -> Result<Vec<Task>, TaskError> {
        let query = Query::new(TASK_KIND).order("created");
        let entities = self.client.get_all(&query).await?;
        let tasks = entities
            .iter()
            .map(Task::from_entity)
            .collect::<Result<Vec<_>, _>>()?;
        debug!("[TASKS] Listed {} tasks", tasks.len());
        Ok(tasks)
    }

    /// Deleting a task that does not exist is not an error.
    pub async fn delete_task(&self, id: i64) -> Result<(), TaskError> {
        self.client.delete(&Key::with_id(TASK_KIND, id)).await?;
        info!("[TASKS] Deleted task {}", id);
        Ok(())
    }
}
