// file: src/pipeline/decode.rs
// description: per-waveform SSTV signal recovery into decoded images
// reference: blocking decode on the blocking pool

use crate::artifacts::stage_image;
use crate::error::Result;
use crate::models::WorkItem;
use crate::pipeline::fanout::{Attempt, ItemProcessor};
use crate::sstv::{SstvDecoder, Waveform};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

pub struct DecodeStage {
    decoder: Arc<dyn SstvDecoder>,
}

impl DecodeStage {
    pub fn new(decoder: Arc<dyn SstvDecoder>) -> Self {
        Self { decoder }
    }
}

#[async_trait]
impl ItemProcessor for DecodeStage {
    async fn process(&self, item: &WorkItem, attempt: &Attempt) -> Result<PathBuf> {
        let decoder = Arc::clone(&self.decoder);
        let input = item.input.clone();
        let output = item.output.clone();

        let staged = attempt
            .blocking(move || {
                let waveform = Waveform::read_wav(&input)?;
                let image = decoder.decode(&waveform)?;
                stage_image(&output, &image)
            })
            .await?;
        attempt.publish(staged)
    }
}
