use async_trait::async_trait;
use sqlx::PgConnection;

use seedsmith_core::Row;

use crate::errors::Result;

/// One step of a story.
#[derive(Debug, Clone, PartialEq)]
pub enum StoryStep {
    /// Insert `values` into `table`; the story is then resumed with the
    /// fully resolved row.
    Emit { table: String, values: Row },
    /// The story has finished; it has no more rows to generate.
    Done,
}

impl StoryStep {
    pub fn emit(table: impl Into<String>, values: Row) -> Self {
        StoryStep::Emit {
            table: table.into(),
            values,
        }
    }
}

/// A resumable multi-table sequence representing one causally linked
/// synthetic entity, e.g. a person and the hospital visits that reference
/// that person's database-assigned identifier.
///
/// The driver calls [`next`](Story::next) with `None` first. Each later
/// call passes the fully resolved row of the previous step: the emitted
/// values merged with generator defaults and with everything the database
/// assigned on insert. A story must signal [`StoryStep::Done`] after a
/// finite number of steps; it owns no state once it has done so.
///
/// All inserts of one story instance run inside a single transaction, so
/// a failing step rolls back the whole story.
#[async_trait]
pub trait Story: Send {
    async fn next(&mut self, conn: &mut PgConnection, feedback: Option<Row>) -> Result<StoryStep>;
}

/// Factory producing a fresh story instance per execution.
pub type StoryFactory = Box<dyn Fn() -> Box<dyn Story> + Send + Sync>;

/// A named story registration: how many instances to run per pass, and a
/// factory for fresh instances.
pub struct StoryDescriptor {
    pub name: String,
    pub stories_per_pass: u32,
    factory: StoryFactory,
}

impl StoryDescriptor {
    pub fn new<F>(name: impl Into<String>, stories_per_pass: u32, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Story> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            stories_per_pass,
            factory: Box::new(factory),
        }
    }

    /// A fresh story instance.
    pub fn instantiate(&self) -> Box<dyn Story> {
        (self.factory)()
    }
}

impl std::fmt::Debug for StoryDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoryDescriptor")
            .field("name", &self.name)
            .field("stories_per_pass", &self.stories_per_pass)
            .finish()
    }
}
