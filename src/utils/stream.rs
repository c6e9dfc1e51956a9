use std::collections::VecDeque;

use crate::config::STREAM_CAPACITY;

/// 有界环形数据流
///
/// 写满后覆盖最旧的元素，写入方永远不会被阻塞；读取方跟不上时只会丢帧。
pub struct Stream<T> {
    pool: VecDeque<T>,
    capacity: usize,
    dropped: u64,
}

impl<T> Stream<T> {
    pub fn new() -> Self {
        Self::with_capacity(STREAM_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            pool: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// 写入一个元素，缓冲区已满时返回被挤出的最旧元素
    pub fn write(&mut self, item: T) -> Option<T> {
        let evicted = if self.pool.len() == self.capacity {
            self.dropped += 1;
            self.pool.pop_front()
        } else {
            None
        };
        self.pool.push_back(item);
        evicted
    }

    /// 按写入顺序读取最旧的元素
    pub fn read(&mut self) -> Option<T> {
        self.pool.pop_front()
    }

    /// 丢弃积压，只取最新的元素
    pub fn read_latest(&mut self) -> Option<T> {
        let latest = self.pool.pop_back();
        self.dropped += self.pool.len() as u64;
        self.pool.clear();
        latest
    }

    /// 取出全部积压元素
    pub fn drain(&mut self) -> Vec<T> {
        self.pool.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 累计被覆盖或跳过的元素数量
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl<T> Default for Stream<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut stream = Stream::with_capacity(4);
        for i in 0..3 {
            assert!(stream.write(i).is_none());
        }
        assert_eq!(stream.read(), Some(0));
        assert_eq!(stream.read(), Some(1));
        assert_eq!(stream.len(), 1);
    }

    #[test]
    fn test_overwrites_oldest_when_full() {
        let mut stream = Stream::with_capacity(2);
        stream.write('a');
        stream.write('b');
        assert_eq!(stream.write('c'), Some('a'));
        assert_eq!(stream.dropped(), 1);
        assert_eq!(stream.drain(), vec!['b', 'c']);
        assert!(stream.is_empty());
    }

    #[test]
    fn test_read_latest_skips_backlog() {
        let mut stream = Stream::new();
        for i in 0..5 {
            stream.write(i);
        }
        assert_eq!(stream.read_latest(), Some(4));
        assert_eq!(stream.dropped(), 4);
        assert_eq!(stream.read(), None);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut stream = Stream::with_capacity(0);
        assert_eq!(stream.capacity(), 1);
        stream.write(1);
        assert_eq!(stream.write(2), Some(1));
    }
}
