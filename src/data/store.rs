// ============================================================
// Layer 4 — SampleStore
// ============================================================
// One corpus file, loaded, aligned and sharded for this rank.
//
// Loading is a pure transform: parse → check objective → pad →
// chunk → shard. The resulting sample list never changes; moving
// to another file means building a new store and dropping the old
// one, which releases its memory.
//
// Materialisation is lazy: samples stay in their raw shape until
// the cursor asks for them, so a large file costs one parse and
// no per-sample padding up front.
//
// Reference: Burn Book §4 (Dataset trait)

use anyhow::Result;
use burn::data::dataset::Dataset;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::data::{
    alignment::{align_to_step, chunk_windows, shard_by_rank},
    format::{self, CorpusFormat, RawCorpus},
    materialize::{MaterializedSample, Materializer},
};
use crate::domain::{error::PipelineError, sample::Sample};
use crate::infra::config::PipelineConfig;

pub struct SampleStore {
    path:         PathBuf,
    format:       CorpusFormat,
    samples:      Vec<Sample>,
    materializer: Materializer,
}

impl SampleStore {
    /// Load `path` for this rank.
    ///
    /// Returns `Ok(None)` when the file is too small to give every rank
    /// at least one sample; the shortfall is logged and the caller moves
    /// on to the next file.
    pub fn load(path: &Path, cfg: &PipelineConfig) -> Result<Option<SampleStore>> {
        let format = CorpusFormat::from_path(path)
            .ok_or_else(|| PipelineError::UnsupportedFormat { path: path.to_path_buf() })?;
        format.check_objective(path, cfg.objective)?;

        let (_, corpus) = format::parse(path)?;
        let samples = match corpus {
            RawCorpus::Tokens(tokens) => {
                let step = cfg.world_size * cfg.sample_size();
                if tokens.len() < step {
                    tracing::warn!(
                        "Dataset file {} does not have enough data and will be ignored. \
                         Expected at least {} tokens but found only {}",
                        path.display(),
                        step,
                        tokens.len()
                    );
                    return Ok(None);
                }
                let pre_size = tokens.len();
                let (tokens, padding) = align_to_step(tokens, step);
                log_alignment(path, pre_size, tokens.len(), padding);

                let windows = chunk_windows(Arc::from(tokens), cfg.sample_size());
                shard_by_rank(windows, cfg.rank, cfg.world_size)
                    .into_iter()
                    .map(Sample::Continuous)
                    .collect()
            }
            RawCorpus::Records(records) => {
                if let Some(bad) = records.iter().find(|s| !cfg.objective.accepts(s.kind())) {
                    return Err(PipelineError::SampleObjectiveMismatch {
                        path:      path.to_path_buf(),
                        kind:      bad.kind(),
                        objective: cfg.objective,
                    }
                    .into());
                }
                if records.len() < cfg.world_size {
                    tracing::warn!(
                        "Dataset file {} does not have enough data and will be ignored. \
                         Expected at least {} samples but found only {}",
                        path.display(),
                        cfg.world_size,
                        records.len()
                    );
                    return Ok(None);
                }
                let pre_size = records.len();
                let (records, padding) = align_to_step(records, cfg.world_size);
                log_alignment(path, pre_size, records.len(), padding);

                shard_by_rank(records, cfg.rank, cfg.world_size)
            }
        };

        tracing::debug!(
            "Parsed {} ({}): {} samples for rank {}/{}",
            path.display(),
            format.name(),
            samples.len(),
            cfg.rank,
            cfg.world_size
        );

        Ok(Some(SampleStore {
            path: path.to_path_buf(),
            format,
            samples,
            materializer: Materializer::from_config(cfg),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> CorpusFormat {
        self.format
    }

    pub fn materialize(&self, index: usize) -> Result<MaterializedSample> {
        let sample = self.samples.get(index).ok_or_else(|| {
            PipelineError::invalid_sample(format!(
                "index {index} is out of range for {} samples in {}",
                self.samples.len(),
                self.path.display()
            ))
        })?;
        Ok(self.materializer.materialize(sample)?)
    }

    /// Materialise `count` consecutive samples starting at `start`.
    pub fn materialize_range(&self, start: usize, count: usize) -> Result<Vec<MaterializedSample>> {
        (start..start + count).map(|i| self.materialize(i)).collect()
    }
}

fn log_alignment(path: &Path, pre_size: usize, post_size: usize, padding: usize) {
    if padding > 0 {
        tracing::info!(
            "Data aligned ({}). Pre-alignment size: {}, post-alignment size: {}, padding added: {}",
            path.display(),
            pre_size,
            post_size,
            padding
        );
    }
}

impl Dataset<Sample> for SampleStore {
    fn get(&self, index: usize) -> Option<Sample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::materialize::TokenSample;
    use crate::domain::objective::Objective;
    use std::fs;
    use tempfile::TempDir;

    /// Write `tokens` as a little-endian u16 stream.
    pub(crate) fn write_bin(dir: &Path, name: &str, tokens: &[u16]) -> PathBuf {
        let path  = dir.join(name);
        let bytes: Vec<u8> = tokens.iter().flat_map(|t| t.to_le_bytes()).collect();
        fs::write(&path, bytes).unwrap();
        path
    }

    fn cfg(block_size: usize, world_size: usize, rank: usize) -> PipelineConfig {
        PipelineConfig { block_size, world_size, rank, ..Default::default() }
    }

    fn first_tokens(store: &SampleStore) -> TokenSample {
        match store.materialize(0).unwrap() {
            MaterializedSample::Tokens(t) => t,
            other => panic!("expected tokens, got {other:?}"),
        }
    }

    #[test]
    fn test_nine_tokens_fall_short_of_two_ranks() {
        let dir  = TempDir::new().unwrap();
        let path = write_bin(dir.path(), "train.bin", &[10, 11, 12, 13, 14, 15, 16, 17, 18]);
        // 2 * (4 + 1) = 10 tokens needed
        assert!(SampleStore::load(&path, &cfg(4, 2, 0)).unwrap().is_none());
        assert!(SampleStore::load(&path, &cfg(4, 2, 1)).unwrap().is_none());
    }

    #[test]
    fn test_ten_tokens_give_one_sample_per_rank() {
        let dir  = TempDir::new().unwrap();
        let path = write_bin(dir.path(), "train.bin", &[10, 11, 12, 13, 14, 15, 16, 17, 18, 19]);

        let rank0 = SampleStore::load(&path, &cfg(4, 2, 0)).unwrap().unwrap();
        let rank1 = SampleStore::load(&path, &cfg(4, 2, 1)).unwrap().unwrap();
        assert_eq!(rank0.len(), 1);
        assert_eq!(rank1.len(), 1);

        let t0 = first_tokens(&rank0);
        assert_eq!(t0.input_ids,  vec![10, 11, 12, 13]);
        assert_eq!(t0.target_ids, vec![11, 12, 13, 14]);

        let t1 = first_tokens(&rank1);
        assert_eq!(t1.input_ids,  vec![15, 16, 17, 18]);
        assert_eq!(t1.target_ids, vec![16, 17, 18, 19]);
    }

    #[test]
    fn test_stream_padding_wraps_to_the_first_tokens() {
        let dir  = TempDir::new().unwrap();
        // 11 tokens → padded to 20 → windows [0..4] [5..9] [10,0..3] [4..8]
        let tokens: Vec<u16> = (0..11).collect();
        let path = write_bin(dir.path(), "train.bin", &tokens);

        let rank0 = SampleStore::load(&path, &cfg(4, 2, 0)).unwrap().unwrap();
        assert_eq!(rank0.len(), 2);
        match rank0.materialize(1).unwrap() {
            MaterializedSample::Tokens(t) => {
                assert_eq!(t.input_ids,  vec![10, 0, 1, 2]);
                assert_eq!(t.target_ids, vec![0, 1, 2, 3]);
            }
            other => panic!("expected tokens, got {other:?}"),
        }
    }

    #[test]
    fn test_too_small_file_is_skipped() {
        let dir  = TempDir::new().unwrap();
        let path = write_bin(dir.path(), "train.bin", &[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        // needs 2 * (8 + 1) = 18 tokens
        assert!(SampleStore::load(&path, &cfg(8, 2, 0)).unwrap().is_none());
    }

    #[test]
    fn test_records_padded_at_sample_granularity() {
        let dir  = TempDir::new().unwrap();
        let path = dir.path().join("train.jsonl");
        fs::write(
            &path,
            "{\"input_ids\":[0,0,0]}\n{\"input_ids\":[1,1,1]}\n{\"input_ids\":[2,2,2]}\n",
        )
        .unwrap();

        let c      = PipelineConfig { objective: Objective::Instruction, ..cfg(2, 2, 1) };
        let store  = SampleStore::load(&path, &c).unwrap().unwrap();
        // 3 records → 4 after cyclic padding → rank 1 keeps records 1 and 0
        let first: Vec<i32> = (0..store.len())
            .map(|i| match store.get(i).unwrap() {
                Sample::Instruction(r) => r.input_ids[0],
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(first, vec![1, 0]);
    }

    #[test]
    fn test_token_stream_rejected_for_instruction_objective() {
        let dir  = TempDir::new().unwrap();
        let path = write_bin(dir.path(), "train.bin", &[1; 32]);
        let c    = PipelineConfig { objective: Objective::Instruction, ..cfg(4, 1, 0) };
        let err  = SampleStore::load(&path, &c).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::FormatObjectiveMismatch { .. })
        ));
    }

    #[test]
    fn test_preference_records_rejected_for_pretraining() {
        let dir  = TempDir::new().unwrap();
        let path = dir.path().join("train.alm");
        fs::write(
            &path,
            r#"{"chosen_input_ids":[1],"chosen_target_ids":[2],"rejected_input_ids":[3],"rejected_target_ids":[4]}"#,
        )
        .unwrap();
        let err = SampleStore::load(&path, &cfg(4, 1, 0)).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::SampleObjectiveMismatch { .. })
        ));
    }

    #[test]
    fn test_materialize_out_of_range_is_an_error() {
        let dir   = TempDir::new().unwrap();
        let path  = write_bin(dir.path(), "train.bin", &[1; 10]);
        let store = SampleStore::load(&path, &cfg(4, 1, 0)).unwrap().unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.materialize(2).is_err());
        assert_eq!(store.materialize_range(0, 2).unwrap().len(), 2);
    }
}
