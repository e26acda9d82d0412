//! SPA route discovery.
//!
//! Clicks a handful of likely route triggers per selector family and keeps
//! the ones that either moved the URL or swapped in stable content.

use crate::activation::ContentPipeline;
use crate::config::{CrawlerConfig, PacingConfig, RouteConfig};
use crate::driver::PageDriver;
use crate::error::{DriverResult, Result};
use crate::result::{now_millis, VisitedRoute};
use regex::Regex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const MIN_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct RouteExplorer {
    config: RouteConfig,
    pacing: PacingConfig,
    pattern: Option<Regex>,
}

impl RouteExplorer {
    pub fn new(config: RouteConfig, pacing: PacingConfig) -> Result<Self> {
        let pattern = config
            .expected_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()?;
        Ok(Self {
            config,
            pacing,
            pattern,
        })
    }

    pub fn from_config(config: &CrawlerConfig) -> Result<Self> {
        Self::new(config.routes.clone(), config.pacing.clone())
    }

    /// Upper bound on routes a single exploration can record.
    pub fn budget(&self) -> usize {
        self.config.budget()
    }

    pub async fn explore(&self, page: &dyn PageDriver, pipeline: &ContentPipeline) -> Vec<VisitedRoute> {
        let mut routes = Vec::new();
        self.explore_into(page, pipeline, &mut routes).await;
        routes
    }

    /// Like [`explore`](Self::explore) but appends as it goes, so a caller that
    /// times the exploration out keeps whatever was found.
    pub async fn explore_into(
        &self,
        page: &dyn PageDriver,
        pipeline: &ContentPipeline,
        routes: &mut Vec<VisitedRoute>,
    ) {
        let budget = self.budget();
        info!("Exploring SPA routes (budget {})", budget);

        for family in &self.config.families {
            let candidates = self.visible_candidates(page, family).await;
            if candidates.is_empty() {
                continue;
            }
            debug!("{} route candidate(s) for {}", candidates.len(), family);

            for (n, &index) in candidates.iter().enumerate() {
                if routes.len() >= budget {
                    return;
                }
                let href = page.attribute(family, index, "href").await.ok().flatten();
                debug!(
                    "Trying route {}[{}] {}",
                    family,
                    index,
                    href.as_deref().unwrap_or("")
                );

                let before = page.url().await.unwrap_or_default();
                match self
                    .navigate_in_spa(
                        page,
                        pipeline,
                        family,
                        index,
                        self.pattern.as_ref(),
                        self.config.timeout,
                    )
                    .await
                {
                    Ok(Some(route)) => {
                        info!("Visited route {} (score {:.1})", route.url, route.content_score);
                        routes.push(route);
                    }
                    Ok(None) => debug!("{}[{}] led nowhere", family, index),
                    Err(e) => warn!("Route candidate {}[{}] failed: {}", family, index, e),
                }

                let is_last = n + 1 == candidates.len();
                if !is_last && page.url().await.is_ok_and(|now| now != before) {
                    if let Err(e) = page.go_back().await {
                        warn!("History back failed: {}", e);
                    }
                    tokio::time::sleep(self.pacing.route_back_pause).await;
                }
            }
        }

        info!("Route exploration finished with {} route(s)", routes.len());
    }

    /// Click `selector[index]` and wait up to `max_wait` for either a URL
    /// change (matching `expected` when given) or, with the URL unchanged,
    /// stable content. Returns `None` when neither happened.
    pub async fn navigate_in_spa(
        &self,
        page: &dyn PageDriver,
        pipeline: &ContentPipeline,
        selector: &str,
        index: usize,
        expected: Option<&Regex>,
        max_wait: Duration,
    ) -> DriverResult<Option<VisitedRoute>> {
        let before = page.url().await?;
        page.click(selector, index).await?;
        tokio::time::sleep(self.pacing.route_settle).await;

        let start = Instant::now();
        let poll = self.config.poll_interval.max(MIN_POLL);
        let check_wait = pipeline.detector.config().route_check_wait;

        loop {
            let current = page.url().await?;
            if current != before {
                if expected.is_none_or(|re| re.is_match(&current)) {
                    info!("Route changed: {} -> {}", before, current);
                    tokio::time::sleep(self.pacing.route_change_pause).await;
                    let state = pipeline.ensure_content(page).await;
                    return Ok(Some(VisitedRoute {
                        title: page.title().await.unwrap_or_default(),
                        url: current,
                        content_score: state.content_score,
                        timestamp: now_millis(),
                    }));
                }
            } else {
                let state = pipeline.detector.detect(page, check_wait).await;
                if state.is_stable && state.has_content {
                    return Ok(Some(VisitedRoute {
                        title: page.title().await.unwrap_or_default(),
                        url: current,
                        content_score: state.content_score,
                        timestamp: now_millis(),
                    }));
                }
            }

            if start.elapsed() >= max_wait {
                return Ok(None);
            }
            tokio::time::sleep(poll).await;
        }
    }

    async fn visible_candidates(&self, page: &dyn PageDriver, selector: &str) -> Vec<usize> {
        let count = match page.count(selector).await {
            Ok(n) => n,
            Err(e) => {
                debug!("Query {} failed: {}", selector, e);
                return Vec::new();
            }
        };
        let mut visible = Vec::new();
        for index in 0..count {
            if visible.len() >= self.config.per_family {
                break;
            }
            if page.is_visible(selector, index).await.unwrap_or(false) {
                visible.push(index);
            }
        }
        visible
    }
}
