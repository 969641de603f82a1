//! Board enumeration from a fixed list.

use async_trait::async_trait;
use buildwatch_core::Result;
use buildwatch_core::ports::BoardEnumerator;

/// Enumerates a fixed set of boards, typically from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticBoards {
    boards: Vec<String>,
}

impl StaticBoards {
    pub fn new(boards: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut boards: Vec<String> = boards.into_iter().map(Into::into).collect();
        boards.sort();
        boards.dedup();
        Self { boards }
    }
}

#[async_trait]
impl BoardEnumerator for StaticBoards {
    async fn enumerate(&self) -> Result<Vec<String>> {
        Ok(self.boards.clone())
    }
}
