//! Career completion: from the "career complete" banner back to the home screen

use super::waiter::{Query, Waiter};
use super::{soften, CareerError};
use crate::config::{CareerSettings, WaiterSettings};

const COMPLETE: &[&str] = &["career_complete"];
const FINISH_BUTTONS: &[&str] = &["button_green", "button_blue"];
const NAV_BUTTONS: &[&str] = &["ui_home", "button_green", "button_white", "button_blue", "button_close"];
const NAV_TEXTS: &[&str] = &["home", "close", "next", "ok", "confirm"];
// buttons that would open team editing instead of leaving
const NAV_FORBID: &[&str] = &["edit", "team"];

#[derive(Debug, Clone)]
pub struct CompletionFlow {
    max_clicks: u32,
    threshold: f32,
}

impl CompletionFlow {
    pub fn new(career: &CareerSettings, waiter: &WaiterSettings) -> Self {
        Self {
            max_clicks: career.completion_max_clicks,
            threshold: waiter.default_threshold,
        }
    }

    /// `Ok(false)` when no career is complete, or when home is not reached
    /// within the click budget.
    pub fn handle_career_completion(&self, w: &mut Waiter) -> Result<bool, CareerError> {
        soften("CompletionFlow", self.try_complete(w))
    }

    fn try_complete(&self, w: &mut Waiter) -> Result<bool, CareerError> {
        if !w.seen(COMPLETE, "career_completion_check_career_complete")? {
            log::debug!("[CompletionFlow] no completed career on screen");
            return Ok(false);
        }
        log::info!("[CompletionFlow] career complete, returning home");

        let banner = Query::new(COMPLETE, "career_completion_1").timeout_ms(10_000);
        if !w.click_when(&banner)? {
            log::warn!("[CompletionFlow] career_complete vanished before it could be clicked");
            return Ok(false);
        }
        w.settle(1500)?;

        if !w.click_when(&self.finish_query())? {
            log::debug!("[CompletionFlow] no finish button, continuing");
        }
        w.settle(5000)?;

        self.return_home(w)
    }

    fn finish_query(&self) -> Query<'static> {
        Query::new(FINISH_BUTTONS, "career_completion_finish")
            .texts(&["finish", "complete", "done"])
            .threshold(self.threshold)
            .timeout_ms(10_000)
    }

    /// Click through result screens until the home anchor shows
    fn return_home(&self, w: &mut Waiter) -> Result<bool, CareerError> {
        for n in 1..=self.max_clicks {
            if w.recognize("career_completion_check")?.has(&["ui_home"]) {
                log::info!("[CompletionFlow] back on the home screen");
                return Ok(true);
            }
            let nav = Query::new(NAV_BUTTONS, format!("career_completion_nav_{n}"))
                .texts(NAV_TEXTS)
                .forbid(NAV_FORBID)
                .threshold(self.threshold)
                .timeout_ms(3000);
            if w.click_when(&nav)? {
                w.settle(1500)?;
            } else {
                w.settle(1000)?;
            }
        }
        log::error!(
            "[CompletionFlow] home not reached after {} navigation attempts",
            self.max_clicks
        );
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abort::test_lock;
    use crate::career::testing::{det, Rig};

    fn flow(max_clicks: u32) -> CompletionFlow {
        let career = CareerSettings {
            completion_max_clicks: max_clicks,
            ..CareerSettings::default()
        };
        CompletionFlow::new(&career, &WaiterSettings::default())
    }

    fn banner() -> Vec<crate::perception::Detection> {
        vec![det("career_complete", 400.0, 200.0, 880.0, 300.0)]
    }

    #[test]
    fn test_nothing_to_complete() {
        let _guard = test_lock::hold();
        let rig = Rig::new();
        let mut w = rig.waiter();
        assert!(!flow(20).handle_career_completion(&mut w).unwrap());
        assert!(rig.clicks().is_empty());
        assert_eq!(rig.script.calls(), vec!["career_completion_check_career_complete"]);
    }

    #[test]
    fn test_clicks_through_to_home() {
        let _guard = test_lock::hold();
        let rig = Rig::new();
        rig.script.always("career_completion_check_career_complete", banner());
        rig.script.always("career_completion_1", banner());

        let finish = det("button_blue", 500.0, 600.0, 780.0, 650.0);
        rig.ocr.text(&finish.xyxy, "Finish");
        rig.script.always("career_completion_finish", vec![finish]);

        let next = det("button_green", 540.0, 620.0, 740.0, 670.0);
        let edit = det("button_white", 100.0, 620.0, 310.0, 670.0);
        rig.ocr.text(&next.xyxy, "Next");
        rig.ocr.text(&edit.xyxy, "Edit Team");
        rig.script.always("career_completion_nav", vec![edit, next]);

        rig.script.once("career_completion_check", vec![]);
        rig.script.once("career_completion_check", vec![]);
        rig.script
            .always("career_completion_check", vec![det("ui_home", 0.0, 680.0, 40.0, 720.0)]);

        let mut w = rig.waiter();
        assert!(flow(20).handle_career_completion(&mut w).unwrap());
        assert_eq!(
            rig.clicks(),
            vec![(640, 250, 1), (640, 625, 1), (640, 645, 1), (640, 645, 1)]
        );
    }

    #[test]
    fn test_finish_button_gets_ten_seconds() {
        let query = flow(20).finish_query();
        assert_eq!(query.timeout, std::time::Duration::from_secs(10));
        assert_eq!(query.classes, FINISH_BUTTONS);
    }

    #[test]
    fn test_gives_up_after_click_budget() {
        let _guard = test_lock::hold();
        let rig = Rig::new();
        rig.script.always("career_completion_check_career_complete", banner());
        rig.script.always("career_completion_1", banner());

        let mut w = rig.waiter();
        assert!(!flow(4).handle_career_completion(&mut w).unwrap());
        assert_eq!(rig.script.count("career_completion_nav_"), 4);
        assert_eq!(rig.clicks().len(), 1);
    }
}
