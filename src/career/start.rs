//! Confirming the career start: TP restoration and the opening skip dialog

use super::waiter::{Query, Waiter};
use super::{soften, CareerError};
use crate::config::{CareerSettings, WaiterSettings};
use crate::geometry::BBox;
use crate::perception::Detection;

const WHITE_BUTTONS: &[&str] = &["button_white", "white_button"];
const START_TEXTS: &[&str] = &["start", "career"];

/// Pick the button right of `anchor` whose vertical center is nearest to the
/// anchor's, within `tolerance` pixels.
pub fn find_aligned_use_button<'a>(
    anchor: &BBox,
    buttons: &[&'a Detection],
    tolerance: f32,
) -> Option<&'a Detection> {
    let (_, anchor_y) = anchor.center();
    buttons
        .iter()
        .copied()
        .filter(|b| b.xyxy.x1 > anchor.x2)
        .map(|b| (b, (b.xyxy.center().1 - anchor_y).abs()))
        .filter(|(_, dy)| *dy < tolerance)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(b, _)| b)
}

/// Start confirmation and the dialogs around it
#[derive(Debug, Clone)]
pub struct StartFlow {
    threshold: f32,
    use_button_y_tolerance: f32,
}

impl StartFlow {
    pub fn new(career: &CareerSettings, waiter: &WaiterSettings) -> Self {
        Self {
            threshold: waiter.default_threshold,
            use_button_y_tolerance: career.use_button_y_tolerance,
        }
    }

    fn start_query(&self, tag: &str) -> Query<'static> {
        Query::new(&["button_green"], tag)
            .texts(START_TEXTS)
            .threshold(self.threshold)
            .timeout_ms(5000)
    }

    /// Double-click "Start Career!", restoring TP in between when prompted
    pub fn confirm_career_start(&self, w: &mut Waiter) -> Result<bool, CareerError> {
        soften("StartFlow", self.try_confirm(w))
    }

    fn try_confirm(&self, w: &mut Waiter) -> Result<bool, CareerError> {
        log::info!("[StartFlow] confirming career start");
        if !w.click_when(&self.start_query("career_start_confirm_1"))? {
            log::warn!("[StartFlow] Start Career button not found");
            return Ok(false);
        }
        w.settle(1500)?;

        if self.restore_prompted(w)? {
            log::info!("[StartFlow] TP restoration needed");
            if !self.restore_tp(w)? {
                log::warn!("[StartFlow] TP restoration failed, continuing anyway");
            }
        }

        let second = w.click_when(&self.start_query("career_start_confirm_2"))?;
        w.settle(1000)?;
        let third = w.click_when(&self.start_query("career_start_confirm_3"))?;
        if !(second || third) {
            log::warn!("[StartFlow] second Start Career click did not land");
            return Ok(false);
        }
        log::info!("[StartFlow] career start confirmed");
        Ok(true)
    }

    /// Whether any green button on screen reads "restore"
    fn restore_prompted(&self, w: &mut Waiter) -> Result<bool, CareerError> {
        let frame = w.recognize("career_start_restore_check")?;
        if !w.perception().has_ocr() {
            return Ok(false);
        }
        Ok(frame
            .of_class(&["button_green"])
            .iter()
            .any(|d| w.text_in(&frame, &d.xyxy).to_lowercase().contains("restore")))
    }

    /// Restore → Use (aligned with the TP icon, carat as fallback) → OK → Close
    pub fn restore_tp(&self, w: &mut Waiter) -> Result<bool, CareerError> {
        let restore = Query::new(&["button_green"], "tp_restore_1")
            .texts(&["restore"])
            .threshold(self.threshold)
            .timeout_ms(5000);
        if !w.click_when(&restore)? {
            log::warn!("[StartFlow] Restore button not found");
            return Ok(false);
        }
        w.settle(1500)?;

        let frame = w.recognize("tp_restore_popup")?;
        let whites = frame.of_class(WHITE_BUTTONS);
        let (anchor, use_carat) = match frame.of_class(&["ui_tp"]).first() {
            Some(tp) => (tp.xyxy, false),
            None => match frame.of_class(&["ui_carat"]).first() {
                Some(carat) => {
                    log::warn!("[StartFlow] ui_tp not found, using carat");
                    (carat.xyxy, true)
                }
                None => {
                    log::error!("[StartFlow] neither ui_tp nor ui_carat found");
                    return Ok(false);
                }
            },
        };
        if whites.is_empty() {
            log::error!("[StartFlow] no white buttons in the restore popup");
            return Ok(false);
        }

        match find_aligned_use_button(&anchor, &whites, self.use_button_y_tolerance) {
            Some(button) => {
                let button = button.clone();
                w.click(&button, 1)?;
                w.settle(1000)?;
            }
            None => {
                log::warn!("[StartFlow] no aligned Use button, matching by text");
                let by_text = Query::new(WHITE_BUTTONS, "tp_restore_use")
                    .texts(&["use"])
                    .threshold(self.threshold)
                    .timeout_ms(3000);
                if !w.click_when(&by_text)? {
                    log::error!("[StartFlow] Use button not found");
                    return Ok(false);
                }
            }
        }

        if use_carat {
            let plus = Query::new(&["button_plus"], "carat_restore_add").timeout_ms(3000);
            if !w.click_when(&plus)? {
                log::error!("[StartFlow] carat plus button not found");
                return Ok(false);
            }
        }

        let ok = Query::new(&["button_green"], "tp_restore_ok")
            .texts(&["ok", "confirm"])
            .threshold(self.threshold)
            .timeout_ms(5000);
        if !w.click_when(&ok)? {
            log::warn!("[StartFlow] OK button not found");
            return Ok(false);
        }
        w.settle(4000)?;

        let close = Query::new(WHITE_BUTTONS, "tp_restore_close")
            .texts(&["close"])
            .threshold(0.38)
            .timeout_ms(5000);
        if !w.click_when(&close)? {
            log::warn!("[StartFlow] Close button not found");
            return Ok(false);
        }
        log::info!("[StartFlow] TP restored");
        w.settle(3000)?;
        Ok(true)
    }

    /// Decline the optional skip dialog. Its absence is not a failure.
    pub fn handle_skip_dialog(&self, w: &mut Waiter) -> Result<bool, CareerError> {
        soften("StartFlow", self.try_skip_dialog(w))
    }

    fn try_skip_dialog(&self, w: &mut Waiter) -> Result<bool, CareerError> {
        let skip = Query::new(&["button_skip"], "career_start_skip_1").timeout_ms(10_000);
        if !w.click_when(&skip)? {
            log::debug!("[StartFlow] no skip dialog");
            return Ok(true);
        }
        w.settle(1000)?;

        let no_skip = |tag: &str| Query::new(&["no_skip"], tag).timeout_ms(5000).clicks(2);
        let declined = w.click_when(&no_skip("career_start_no_skip_1"))?;
        w.settle(1000)?;
        if !declined {
            log::warn!("[StartFlow] no_skip not found, retrying");
            w.click_when(&no_skip("career_start_no_skip_2"))?;
        }
        w.settle(1000)?;

        let confirm = Query::new(&["button_green"], "career_start_skip_confirm")
            .texts(&["confirm"])
            .threshold(self.threshold);
        if w.click_when(&confirm)? {
            log::info!("[StartFlow] skip dialog handled");
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abort::test_lock;
    use crate::career::testing::{det, Rig};

    fn flow() -> StartFlow {
        StartFlow::new(&CareerSettings::default(), &WaiterSettings::default())
    }

    #[test]
    fn test_find_aligned_use_button() {
        let tp = BBox::new(100.0, 273.6, 200.0, 371.7);
        let left = det("button_white", 10.0, 300.0, 90.0, 340.0);
        let far = det("button_white", 500.0, 152.0, 600.0, 211.0);
        let near = det("button_white", 500.0, 300.0, 600.0, 350.0);
        let picked = find_aligned_use_button(&tp, &[&left, &far, &near], 100.0).unwrap();
        assert_eq!(picked.xyxy, near.xyxy);

        // the upper button is 141 px off-center: outside the tolerance
        assert!(find_aligned_use_button(&tp, &[&left, &far], 100.0).is_none());
        assert!(find_aligned_use_button(&tp, &[], 100.0).is_none());
    }

    fn start_button(rig: &Rig) -> Detection {
        let start = det("button_green", 500.0, 600.0, 780.0, 660.0);
        rig.ocr.text(&start.xyxy, "Start Career!");
        start
    }

    #[test]
    fn test_confirm_without_restore() {
        let _guard = test_lock::hold();
        let rig = Rig::new();
        rig.script.always("career_start_confirm", vec![start_button(&rig)]);

        let mut w = rig.waiter();
        assert!(flow().confirm_career_start(&mut w).unwrap());
        assert_eq!(rig.clicks(), vec![(640, 630, 1); 3]);
        assert_eq!(rig.script.count("tp_restore"), 0);
    }

    #[test]
    fn test_confirm_succeeds_when_one_final_click_lands() {
        let _guard = test_lock::hold();
        let rig = Rig::new();
        rig.script.always("career_start_confirm_1", vec![start_button(&rig)]);
        rig.script.always("career_start_confirm_3", vec![start_button(&rig)]);

        let mut w = rig.waiter();
        assert!(flow().confirm_career_start(&mut w).unwrap());
        assert_eq!(rig.clicks().len(), 2);
    }

    #[test]
    fn test_confirm_fails_without_start_button() {
        let _guard = test_lock::hold();
        let rig = Rig::new();
        let mut w = rig.waiter();
        assert!(!flow().confirm_career_start(&mut w).unwrap());
    }

    #[test]
    fn test_confirm_runs_tp_restoration() {
        let _guard = test_lock::hold();
        let rig = Rig::new();
        rig.script.always("career_start_confirm", vec![start_button(&rig)]);

        let restore = det("button_green", 400.0, 500.0, 560.0, 550.0);
        rig.ocr.text(&restore.xyxy, "Restore");
        rig.script.always("career_start_restore_check", vec![restore.clone()]);
        rig.script.always("tp_restore_1", vec![restore]);

        let tp = det("ui_tp", 100.0, 274.0, 200.0, 372.0);
        let use_tp = det("button_white", 500.0, 300.0, 600.0, 350.0);
        let use_carat = det("button_white", 500.0, 152.0, 600.0, 211.0);
        rig.script.always("tp_restore_popup", vec![tp, use_carat, use_tp]);

        let ok = det("button_green", 300.0, 400.0, 420.0, 440.0);
        rig.ocr.text(&ok.xyxy, "OK");
        rig.script.always("tp_restore_ok", vec![ok]);

        let close = det("button_white", 300.0, 450.0, 430.0, 490.0);
        rig.ocr.text(&close.xyxy, "Close");
        rig.script.always("tp_restore_close", vec![close]);

        let mut w = rig.waiter();
        assert!(flow().confirm_career_start(&mut w).unwrap());
        assert_eq!(
            rig.clicks(),
            vec![
                (640, 630, 1),
                (480, 525, 1),
                (550, 325, 1),
                (360, 420, 1),
                (365, 470, 1),
                (640, 630, 1),
                (640, 630, 1),
            ]
        );
    }

    #[test]
    fn test_restore_uses_carat_fallback() {
        let _guard = test_lock::hold();
        let rig = Rig::new();
        let restore = det("button_green", 400.0, 500.0, 560.0, 550.0);
        rig.ocr.text(&restore.xyxy, "Restore");
        rig.script.always("tp_restore_1", vec![restore]);
        let carat = det("ui_carat", 100.0, 135.0, 200.0, 231.0);
        let use_carat = det("button_white", 500.0, 152.0, 600.0, 211.0);
        rig.script.always("tp_restore_popup", vec![carat, use_carat]);

        let mut w = rig.waiter();
        // the plus button never shows up
        assert!(!flow().restore_tp(&mut w).unwrap());
        assert_eq!(rig.script.count("carat_restore_add"), 1);
        assert_eq!(rig.clicks().last(), Some(&(550, 182, 1)));
    }

    #[test]
    fn test_skip_dialog_absent_is_fine() {
        let _guard = test_lock::hold();
        let rig = Rig::new();
        let mut w = rig.waiter();
        assert!(flow().handle_skip_dialog(&mut w).unwrap());
        assert!(rig.clicks().is_empty());
    }

    #[test]
    fn test_skip_dialog_declined() {
        let _guard = test_lock::hold();
        let rig = Rig::new();
        rig.script.always("career_start_skip_1", vec![det("button_skip", 0.0, 0.0, 40.0, 40.0)]);
        rig.script.once("career_start_no_skip_1", vec![]);
        rig.script
            .always("career_start_no_skip_2", vec![det("no_skip", 100.0, 100.0, 200.0, 140.0)]);

        let mut w = rig.waiter();
        assert!(flow().handle_skip_dialog(&mut w).unwrap());
        assert_eq!(rig.clicks(), vec![(20, 20, 1), (150, 120, 2)]);
    }
}
