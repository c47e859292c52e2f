use std::collections::BTreeMap;
use std::fmt;

use log::trace;

use crate::config::Counter;
use crate::flash::Category;

/// Observational event sink. Nothing in the FTL reads it back to make decisions.
#[derive(Debug, Default)]
pub struct Recorder {
    events: BTreeMap<(String, Category), Counter>,
    counters: BTreeMap<String, BTreeMap<String, Counter>>,
}

impl Recorder {
    pub fn new() -> Self {
        Recorder::default()
    }

    /// One discrete event, e.g. `("lba_write", lpn, User)`.
    pub fn put(&mut self, kind: &str, key: usize, cat: Category) {
        trace!("{} {} {}", kind, key, cat.as_str());
        *self.events.entry((kind.to_string(), cat)).or_insert(0) += 1;
    }

    pub fn count_me(&mut self, counter: &str, item: &str) {
        *self
            .counters
            .entry(counter.to_string())
            .or_default()
            .entry(item.to_string())
            .or_insert(0) += 1;
    }

    pub fn count(&self, kind: &str, cat: Category) -> Counter {
        self.events.get(&(kind.to_string(), cat)).copied().unwrap_or(0)
    }

    pub fn counter(&self, counter: &str, item: &str) -> Counter {
        self.counters
            .get(counter)
            .and_then(|items| items.get(item))
            .copied()
            .unwrap_or(0)
    }
}

impl fmt::Display for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "kind\tcategory\tcount")?;
        for ((kind, cat), count) in &self.events {
            writeln!(f, "{}\t{}\t{}", kind, cat.as_str(), count)?;
        }
        writeln!(f, "counter.name\titem.name\tcount")?;
        for (name, items) in &self.counters {
            for (item, count) in items {
                writeln!(f, "{}\t{}\t{}", name, item, count)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_events_and_counters() {
        let mut rec = Recorder::new();
        rec.put("lba_write", 3, Category::User);
        rec.put("lba_write", 4, Category::User);
        rec.put("lba_write", 3, Category::Amplified);
        rec.count_me("cache", "hit");
        assert_eq!(rec.count("lba_write", Category::User), 2);
        assert_eq!(rec.count("lba_write", Category::Amplified), 1);
        assert_eq!(rec.count("lba_read", Category::User), 0);
        assert_eq!(rec.counter("cache", "hit"), 1);
        assert_eq!(rec.counter("cache", "miss"), 0);
        assert!(rec.to_string().contains("cache\thit\t1"));
    }
}
