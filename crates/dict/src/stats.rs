use std::fmt;

use crate::dict::Dict;
use crate::hash_table::{Entries, HashTable};
use crate::types::DictType;

/// Chain lengths at or above the last slot are counted together
const CHAIN_HISTOGRAM_LEN: usize = 50;

struct TableStats {
    table: usize,
    size: usize,
    used: usize,
    slots: usize,
    max_chain: usize,
    total_chain: usize,
    histogram: [usize; CHAIN_HISTOGRAM_LEN],
}

impl TableStats {
    fn collect<K, V>(table: usize, ht: &HashTable, entries: &Entries<K, V>) -> Self {
        let mut stats = TableStats {
            table,
            size: ht.bucket_count(),
            used: ht.used,
            slots: 0,
            max_chain: 0,
            total_chain: 0,
            histogram: [0; CHAIN_HISTOGRAM_LEN],
        };
        if ht.used == 0 {
            return stats;
        }

        for idx in 0..ht.bucket_count() {
            let len = ht.chain_len(entries, idx);
            stats.histogram[len.min(CHAIN_HISTOGRAM_LEN - 1)] += 1;
            if len == 0 {
                continue;
            }
            stats.slots += 1;
            stats.total_chain += len;
            stats.max_chain = stats.max_chain.max(len);
        }
        stats
    }
}

impl fmt::Display for TableStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.used == 0 {
            return writeln!(f, "No stats available for empty dictionaries");
        }

        let role = if self.table == 0 {
            "main hash table"
        } else {
            "rehashing target"
        };
        writeln!(f, "Hash table {} stats ({role}):", self.table)?;
        writeln!(f, " table size: {}", self.size)?;
        writeln!(f, " number of elements: {}", self.used)?;
        writeln!(f, " different slots: {}", self.slots)?;
        writeln!(f, " max chain length: {}", self.max_chain)?;
        writeln!(
            f,
            " avg chain length (counted): {:.2}",
            self.total_chain as f64 / self.slots as f64
        )?;
        writeln!(
            f,
            " avg chain length (computed): {:.2}",
            self.used as f64 / self.slots as f64
        )?;
        writeln!(f, " Chain length distribution:")?;
        for (len, &count) in self.histogram.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let at_least = if len == CHAIN_HISTOGRAM_LEN - 1 { ">= " } else { "" };
            writeln!(
                f,
                "   {at_least}{len}: {count} ({:.2}%)",
                count as f64 / self.size as f64 * 100.0
            )?;
        }
        Ok(())
    }
}

impl<T: DictType> Dict<'_, T> {
    /// Human readable report on table sizes and chain lengths, one section
    /// per table in use.
    pub fn stats(&self) -> String {
        let mut report = TableStats::collect(0, &self.ht[0], &self.entries).to_string();
        if self.is_rehashing() {
            report += &TableStats::collect(1, &self.ht[1], &self.entries).to_string();
        }
        report
    }
}

#[cfg(test)]
mod test {
    use super::TableStats;
    use crate::DictConfig;
    use crate::dict::test::tracked;
    use crate::entry::Entry;
    use crate::hash_table::{Entries, HashTable};

    #[test]
    fn empty() {
        let config = DictConfig::new();
        let (d, _) = tracked(&config);
        assert_eq!(d.stats(), "No stats available for empty dictionaries\n");
    }

    #[test]
    fn main_table_report() {
        let config = DictConfig::new();
        let (mut d, _) = tracked(&config);
        for k in [0, 4, 1] {
            d.add(k, String::new()).unwrap();
        }

        let expected = "\
Hash table 0 stats (main hash table):
 table size: 4
 number of elements: 3
 different slots: 2
 max chain length: 2
 avg chain length (counted): 1.50
 avg chain length (computed): 1.50
 Chain length distribution:
   0: 2 (50.00%)
   1: 1 (25.00%)
   2: 1 (25.00%)
";
        assert_eq!(d.stats(), expected);
    }

    #[test]
    fn rehashing_reports_both_tables() {
        let config = DictConfig::new();
        let (mut d, _) = tracked(&config);
        for k in 0..5 {
            d.add(k, String::new()).unwrap();
        }
        assert!(d.is_rehashing());

        let report = d.stats();
        assert!(report.starts_with("Hash table 0 stats (main hash table):\n table size: 4\n"));
        assert!(report.contains("Hash table 1 stats (rehashing target):\n table size: 8\n"));
    }

    #[test]
    fn long_chains_share_the_last_slot() {
        let mut entries: Entries<u64, ()> = Entries::with_key();
        let mut ht = HashTable::new_with_buckets(4);
        for k in 0..60 {
            let id = entries.insert(Entry::new(k, None));
            ht.push_front(&mut entries, 0, id);
        }

        let report = TableStats::collect(0, &ht, &entries).to_string();
        assert!(report.contains(" max chain length: 60\n"));
        assert!(report.contains("   0: 3 (75.00%)\n"));
        assert!(report.contains("   >= 49: 1 (25.00%)\n"));
    }
}
