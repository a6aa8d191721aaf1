//! Budgeted, prompt-sized text summary of a collection.

use log::debug;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

use crate::config::SummaryConfig;
use crate::records::NormalizedRecord;

/// Share of the budget reserved for the highest-rated records, in tenths.
const TOP_RATED_TENTHS: usize = 7;

pub struct SummaryBuilder {
    max_items: usize,
    rng: StdRng,
}

impl SummaryBuilder {
    pub fn new(max_items: usize, rng: StdRng) -> Self {
        Self {
            max_items: max_items.max(1),
            rng,
        }
    }

    pub fn seeded(max_items: usize, seed: u64) -> Self {
        Self::new(max_items, StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy(max_items: usize) -> Result<Self, getrandom::Error> {
        let mut seed = [0u8; 32];
        getrandom::fill(&mut seed)?;
        Ok(Self::new(max_items, StdRng::from_seed(seed)))
    }

    /// Uses the configured seed when present so runs can be reproduced.
    pub fn from_config(config: &SummaryConfig) -> Result<Self, getrandom::Error> {
        match config.seed {
            Some(seed) => Ok(Self::seeded(config.max_items, seed)),
            None => Self::from_entropy(config.max_items),
        }
    }

    /// One line per selected record. A leading note states the sample size when
    /// the collection is larger than the budget.
    pub fn build_summary(&mut self, records: &[NormalizedRecord]) -> String {
        let selected = self.select(records);
        let mut lines = Vec::with_capacity(selected.len() + 1);
        if selected.len() < records.len() {
            lines.push(format!(
                "Your full collection has {} records. This summary includes a sample of {} representative records.",
                records.len(),
                selected.len()
            ));
        }
        lines.extend(selected.iter().map(|&position| summary_line(&records[position])));
        lines.join("\n")
    }

    /// Indices into `records`: all of them in order when within budget, otherwise
    /// the top-rated share followed by a uniform random fill.
    fn select(&mut self, records: &[NormalizedRecord]) -> Vec<usize> {
        let budget = self.max_items;
        if records.len() <= budget {
            return (0..records.len()).collect();
        }

        let mut rated = records
            .iter()
            .enumerate()
            .filter_map(|(position, record)| {
                record.raw.numeric_rating().map(|rating| (position, rating))
            })
            .collect::<Vec<_>>();
        if rated.is_empty() {
            debug!("SummaryBuilder: no rated records, sampling {budget} at random");
            return index::sample(&mut self.rng, records.len(), budget).into_vec();
        }

        rated.sort_by(|left, right| right.1.total_cmp(&left.1));
        let top_count = (budget * TOP_RATED_TENTHS).div_ceil(10).min(rated.len());
        let mut selected = rated
            .iter()
            .take(top_count)
            .map(|(position, _)| *position)
            .collect::<Vec<_>>();

        let mut taken = vec![false; records.len()];
        for &position in &selected {
            taken[position] = true;
        }
        let pool = (0..records.len())
            .filter(|position| !taken[*position])
            .collect::<Vec<_>>();
        let fill = (budget - selected.len()).min(pool.len());
        selected.extend(
            index::sample(&mut self.rng, pool.len(), fill)
                .into_iter()
                .map(|pick| pool[pick]),
        );
        debug!(
            "SummaryBuilder: {} top-rated and {} sampled of {}",
            top_count,
            fill,
            records.len()
        );
        selected
    }
}

fn summary_line(record: &NormalizedRecord) -> String {
    let mut line = format!(
        "{} - {} ({})",
        record.artist,
        record.title,
        record.year_label()
    );
    let mut tags = Vec::with_capacity(2);
    if record.has_genre() {
        tags.push(record.genre_clean.as_str());
    }
    if record.has_style() && record.style_clean != record.genre_clean {
        tags.push(record.style_clean.as_str());
    }
    if !tags.is_empty() {
        line.push_str(" | ");
        line.push_str(&tags.join(", "));
    }
    line
}
