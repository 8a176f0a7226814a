//! 分数账本 - 业务能力层
//!
//! 并发安全的 学生 → 评分结果 映射。每次更新在同一把锁内完成写入和通知，
//! 所以订阅者看到的快照彼此之间是全序的，不会出现丢失更新。

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::models::ScoreResult;

/// 账本快照，按学生排序
pub type LedgerSnapshot = BTreeMap<String, ScoreResult>;

/// 更新通知：参数为更新后的完整快照和本次更新涉及的学生
pub type LedgerSubscriber = Box<dyn Fn(&LedgerSnapshot, &[String]) + Send + Sync>;

#[derive(Default)]
pub struct ScoreLedger {
    entries: Mutex<LedgerSnapshot>,
    subscriber: Option<LedgerSubscriber>,
}

impl ScoreLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用已有结果（例如从分数文件恢复的）初始化账本，不触发通知
    pub fn with_entries<I>(results: I) -> Self
    where
        I: IntoIterator<Item = ScoreResult>,
    {
        let entries = results
            .into_iter()
            .map(|result| (result.student_id.clone(), result))
            .collect();
        Self {
            entries: Mutex::new(entries),
            subscriber: None,
        }
    }

    /// 注册更新订阅者（通常用于落盘）
    pub fn with_subscriber<F>(mut self, subscriber: F) -> Self
    where
        F: Fn(&LedgerSnapshot, &[String]) + Send + Sync + 'static,
    {
        self.subscriber = Some(Box::new(subscriber));
        self
    }

    /// 写入单个学生的结果，已有记录会被覆盖
    pub fn update(&self, result: ScoreResult) {
        self.update_many(vec![result]);
    }

    /// 在一次加锁内写入多个结果，订阅者只收到一次通知
    pub fn update_many(&self, results: Vec<ScoreResult>) {
        if results.is_empty() {
            return;
        }

        let mut entries = self.lock();
        let changed: Vec<String> = results
            .into_iter()
            .map(|result| {
                let key = result.student_id.clone();
                entries.insert(key.clone(), result);
                key
            })
            .collect();
        debug!("账本更新 {} 条，共 {} 条", changed.len(), entries.len());

        if let Some(subscriber) = &self.subscriber {
            subscriber(&entries, &changed);
        }
    }

    /// 当前内容的拷贝
    pub fn snapshot(&self) -> LedgerSnapshot {
        self.lock().clone()
    }

    pub fn get(&self, student_id: &str) -> Option<ScoreResult> {
        self.lock().get(student_id).cloned()
    }

    pub fn contains(&self, student_id: &str) -> bool {
        self.lock().contains_key(student_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// 订阅者 panic 不应让账本永久不可用
    fn lock(&self) -> MutexGuard<'_, LedgerSnapshot> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
