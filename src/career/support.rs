//! Borrowing a support card

use super::types::SupportCardInfo;
use super::waiter::{Query, Waiter};
use super::{soften, CareerError};
use crate::config::SupportSettings;
use crate::geometry::BBox;
use crate::perception::{fuzzy_ratio, Detection};

const CONTAINER: &str = "career_support_container";
const LEVEL: &str = "career_support_level";
const NAME: &str = "career_support_name";

const MAX_LEVEL: i64 = 50;

/// First detection of `class` whose center lies inside `container`
pub fn find_in_container<'a>(
    dets: &'a [Detection],
    container: &BBox,
    class: &str,
) -> Option<&'a Detection> {
    dets.iter()
        .filter(|d| d.name == class)
        .find(|d| container.contains_center_of(&d.xyxy))
}

/// Scans the borrow popup and picks the preferred support card, refreshing
/// the list a bounded number of times before settling for the top card
#[derive(Debug, Clone)]
pub struct SupportSelectFlow {
    preferred_name: String,
    preferred_level: u32,
    max_refresh_attempts: u32,
    refresh_wait_ms: u64,
    name_threshold: f32,
    popup_timeout_ms: u64,
    scan_timeout_ms: u64,
}

impl SupportSelectFlow {
    pub fn new(cfg: &SupportSettings) -> Self {
        Self {
            preferred_name: cfg.preferred_name.clone(),
            preferred_level: cfg.preferred_level,
            max_refresh_attempts: cfg.max_refresh_attempts,
            refresh_wait_ms: cfg.refresh_wait_ms,
            name_threshold: cfg.name_threshold,
            popup_timeout_ms: cfg.popup_timeout_ms,
            scan_timeout_ms: cfg.scan_timeout_ms,
        }
    }

    pub fn select_optimal_support(&self, w: &mut Waiter) -> Result<bool, CareerError> {
        soften("SupportSelectFlow", self.try_select(w))
    }

    fn try_select(&self, w: &mut Waiter) -> Result<bool, CareerError> {
        log::info!(
            "[SupportSelectFlow] looking for '{}' level {}",
            self.preferred_name,
            self.preferred_level
        );
        if !self.open_popup(w)? {
            log::error!("[SupportSelectFlow] could not open the support popup");
            return Ok(false);
        }

        let scans = self.max_refresh_attempts + 1;
        for attempt in 0..scans {
            log::debug!("[SupportSelectFlow] scan {}/{}", attempt + 1, scans);
            let cards = self.scan_cards(w, "support_scan")?;

            if cards.is_empty() {
                log::warn!("[SupportSelectFlow] no support cards on scan {}", attempt + 1);
            } else if let Some((card, ratio)) = self.find_optimal_support(&cards) {
                log::info!(
                    "[SupportSelectFlow] match '{}' level {} (ratio {:.2})",
                    card.name,
                    card.level,
                    ratio
                );
                return self.select_card(w, card);
            }

            if attempt + 1 < scans && !self.refresh(w)? {
                log::warn!("[SupportSelectFlow] refresh failed");
                break;
            }
        }

        log::info!("[SupportSelectFlow] preferred support not found, taking the top card");
        let cards = self.scan_cards(w, "support_fallback_scan")?;
        match cards.first() {
            Some(top) => self.select_card(w, top),
            None => {
                log::error!("[SupportSelectFlow] no support cards available");
                Ok(false)
            }
        }
    }

    /// Best card at the preferred level whose name ratio clears the threshold
    pub fn find_optimal_support<'a>(
        &self,
        cards: &'a [SupportCardInfo],
    ) -> Option<(&'a SupportCardInfo, f32)> {
        let mut best: Option<(&SupportCardInfo, f32)> = None;
        for card in cards.iter().filter(|c| c.level == self.preferred_level) {
            let ratio = fuzzy_ratio(&card.name, &self.preferred_name);
            log::debug!(
                "[SupportSelectFlow] '{}' level {}: ratio {:.2}",
                card.name,
                card.level,
                ratio
            );
            if ratio >= self.name_threshold && best.map_or(true, |(_, r)| ratio > r) {
                best = Some((card, ratio));
            }
        }
        best
    }

    fn open_popup(&self, w: &mut Waiter) -> Result<bool, CareerError> {
        let query =
            Query::new(&["career_add_friend_support"], "support_open_popup").timeout_ms(self.popup_timeout_ms);
        if !w.click_when(&query)? {
            return Ok(false);
        }
        w.settle(500)?;
        Ok(true)
    }

    fn refresh(&self, w: &mut Waiter) -> Result<bool, CareerError> {
        let query =
            Query::new(&["career_borrow_refresh"], "support_refresh").timeout_ms(self.scan_timeout_ms);
        if !w.click_when(&query)? {
            return Ok(false);
        }
        log::debug!("[SupportSelectFlow] waiting {} ms for the list to refresh", self.refresh_wait_ms);
        w.settle(self.refresh_wait_ms)?;
        Ok(true)
    }

    /// Read every support container on screen, top to bottom.
    /// Perception trouble yields an empty scan.
    pub fn scan_cards(&self, w: &mut Waiter, tag: &str) -> Result<Vec<SupportCardInfo>, CareerError> {
        let frame = match w.recognize(tag) {
            Ok(frame) => frame,
            Err(CareerError::Aborted) => return Err(CareerError::Aborted),
            Err(e) => {
                log::error!("[SupportSelectFlow] scan failed: {}", e);
                return Ok(Vec::new());
            }
        };
        if !w.perception().has_ocr() {
            log::warn!("[SupportSelectFlow] OCR not available, cannot read support cards");
            return Ok(Vec::new());
        }

        let mut containers = frame.of_class(&[CONTAINER]);
        containers.sort_by(|a, b| {
            a.xyxy
                .y1
                .total_cmp(&b.xyxy.y1)
                .then(a.xyxy.x1.total_cmp(&b.xyxy.x1))
        });

        let cards: Vec<SupportCardInfo> = containers
            .iter()
            .enumerate()
            .map(|(i, container)| {
                let level = find_in_container(&frame.dets, &container.xyxy, LEVEL)
                    .and_then(|d| w.perception().digits_in(&frame.image, &d.xyxy))
                    .filter(|l| (1..=MAX_LEVEL).contains(l))
                    .unwrap_or_else(|| {
                        log::debug!("[SupportSelectFlow] card {}: no valid level, using 1", i);
                        1
                    });
                let name = find_in_container(&frame.dets, &container.xyxy, NAME)
                    .map(|d| w.text_in(&frame, &d.xyxy).trim().to_string())
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| "Unknown".to_string());
                log::debug!("[SupportSelectFlow] card {}: '{}' level {}", i, name, level);
                SupportCardInfo {
                    name,
                    level: level as u32,
                    xyxy: container.xyxy,
                    container: (*container).clone(),
                }
            })
            .collect();

        log::info!("[SupportSelectFlow] read {} support cards", cards.len());
        Ok(cards)
    }

    fn select_card(&self, w: &mut Waiter, card: &SupportCardInfo) -> Result<bool, CareerError> {
        log::info!("[SupportSelectFlow] selecting '{}' level {}", card.name, card.level);
        w.click(&card.container, 1)?;
        w.settle(500)?;
        Ok(true)
    }
}
