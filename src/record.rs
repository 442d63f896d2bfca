use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub type Item = HashMap<String, serde_json::Value>;
pub type ItemHandle = Arc<RwLock<Item>>;

/// 一批共享记录。克隆只复制句柄，调度器从不读取其内容。
#[derive(Clone, Default, Debug)]
pub struct RecordBatch {
    items: Arc<Vec<ItemHandle>>,
}

impl RecordBatch {
    pub fn new(items: Vec<Item>) -> Self {
        Self::from_handles(
            items
                .into_iter()
                .map(|item| Arc::new(RwLock::new(item)))
                .collect(),
        )
    }

    pub fn from_handles(handles: Vec<ItemHandle>) -> Self {
        Self {
            items: Arc::new(handles),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ItemHandle> {
        self.items.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ItemHandle> {
        self.items.iter()
    }

    /// 复制当前所有记录的内容
    pub async fn snapshot(&self) -> Vec<Item> {
        let mut out = Vec::with_capacity(self.items.len());
        for handle in self.items.iter() {
            out.push(handle.read().await.clone());
        }
        out
    }
}
