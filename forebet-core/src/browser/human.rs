use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::time::sleep;
use tracing::debug;

use crate::config::HumanSection;

use super::error::ScrapeResult;
use super::page::PageDriver;

#[derive(Debug)]
pub struct HumanSimulator {
    config: HumanSection,
    rng: ChaCha8Rng,
}

impl HumanSimulator {
    pub fn new(config: HumanSection) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    pub fn with_seed(config: HumanSection, seed: u64) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub async fn simulate(&mut self, driver: &mut dyn PageDriver) {
        if let Err(err) = self.scroll_sequence(driver).await {
            debug!(error = %err, "behavior simulation cut short");
        }
    }

    async fn scroll_sequence(&mut self, driver: &mut dyn PageDriver) -> ScrapeResult<()> {
        let steps = self.config.scroll_steps_px.clone();
        for delta in steps {
            let js = format!("window.scrollBy({{ top: {delta}, behavior: 'smooth' }});");
            driver.evaluate(&js).await?;
            sleep(self.random_duration(self.config.step_delay_ms)).await;
        }
        driver
            .evaluate("window.scrollTo({ top: 0, behavior: 'smooth' });")
            .await?;
        sleep(self.random_duration(self.config.return_pause_ms)).await;
        Ok(())
    }

    fn random_duration(&mut self, bounds: [u64; 2]) -> Duration {
        let lower = bounds[0].min(bounds[1]);
        let upper = bounds[0].max(bounds[1]);
        Duration::from_millis(self.rng.gen_range(lower..=upper))
    }
}
