//! Chain-length statistics per generation.

use crate::dict::Dict;
use crate::dict_type::DictType;
use core::fmt;

/// Histogram buckets; chains of this length or longer share the last one.
pub const CHAIN_HISTOGRAM_LEN: usize = 50;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationStats {
    pub generation: usize,
    pub size: usize,
    pub used: usize,
    /// Buckets holding at least one entry.
    pub occupied_slots: usize,
    pub max_chain_len: usize,
    pub total_chain_len: usize,
    /// `chain_histogram[n]` counts buckets with a chain of length `n`.
    pub chain_histogram: [usize; CHAIN_HISTOGRAM_LEN],
}

impl GenerationStats {
    /// Average chain length over occupied buckets, from walking the chains.
    pub fn avg_chain_len_counted(&self) -> f64 {
        if self.occupied_slots == 0 {
            return 0.0;
        }
        self.total_chain_len as f64 / self.occupied_slots as f64
    }

    /// Average chain length over occupied buckets, from the entry count.
    pub fn avg_chain_len_computed(&self) -> f64 {
        if self.occupied_slots == 0 {
            return 0.0;
        }
        self.used as f64 / self.occupied_slots as f64
    }

    fn label(&self) -> &'static str {
        if self.generation == 0 {
            "main hash table"
        } else {
            "rehashing target"
        }
    }
}

impl fmt::Display for GenerationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Hash table {} stats ({}):", self.generation, self.label())?;
        if self.used == 0 {
            return writeln!(f, "No stats available for empty dictionaries");
        }
        writeln!(f, " table size: {}", self.size)?;
        writeln!(f, " number of elements: {}", self.used)?;
        writeln!(f, " different slots: {}", self.occupied_slots)?;
        writeln!(f, " max chain length: {}", self.max_chain_len)?;
        writeln!(f, " avg chain length (counted): {:.2}", self.avg_chain_len_counted())?;
        writeln!(f, " avg chain length (computed): {:.2}", self.avg_chain_len_computed())?;
        writeln!(f, " Chain length distribution:")?;
        for (len, &n) in self.chain_histogram.iter().enumerate() {
            if n == 0 {
                continue;
            }
            let pct = n as f64 / self.size as f64 * 100.0;
            writeln!(f, "   {}: {} ({:.2}%)", len, n, pct)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DictStats {
    pub main: GenerationStats,
    /// Present only while a rehash is in progress.
    pub rehash_target: Option<GenerationStats>,
}

impl fmt::Display for DictStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.main)?;
        if let Some(target) = &self.rehash_target {
            write!(f, "{}", target)?;
        }
        Ok(())
    }
}

impl<K, V, D> Dict<K, V, D>
where
    D: DictType<K, V>,
{
    pub fn stats(&self) -> DictStats {
        DictStats {
            main: self.generation_stats(0),
            rehash_target: self.is_rehashing().then(|| self.generation_stats(1)),
        }
    }

    fn generation_stats(&self, table: usize) -> GenerationStats {
        let g = &self.tables[table];
        let mut s = GenerationStats {
            generation: table,
            size: g.size(),
            used: g.used,
            occupied_slots: 0,
            max_chain_len: 0,
            total_chain_len: 0,
            chain_histogram: [0; CHAIN_HISTOGRAM_LEN],
        };
        if g.used == 0 {
            return s;
        }
        for idx in 0..g.size() {
            let mut len = 0;
            let mut cur = g.head(idx);
            while let Some(k) = cur {
                len += 1;
                cur = self.entries[k].next;
            }
            s.chain_histogram[len.min(CHAIN_HISTOGRAM_LEN - 1)] += 1;
            if len == 0 {
                continue;
            }
            s.occupied_slots += 1;
            s.max_chain_len = s.max_chain_len.max(len);
            s.total_chain_len += len;
        }
        s
    }
}
