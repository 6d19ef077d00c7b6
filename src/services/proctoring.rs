use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::clients::{vision::decode_frame, FaceDetector, FrameDetections};
use crate::utils::logger::LOGGER;

/// Frame width the gaze thresholds below were calibrated for.
const REFERENCE_WIDTH: f64 = 640.0;
const LEFT_LIMIT: f64 = 150.0;
const RIGHT_LIMIT: f64 = 490.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProctorAlert {
    Ok,
    NoFace,
    MultiplePeople,
    LookingLeft,
    LookingRight,
    Invalid,
}

impl ProctorAlert {
    /// Whether the alert describes candidate behaviour rather than a bad frame.
    pub fn is_violation(self) -> bool {
        matches!(
            self,
            ProctorAlert::NoFace
                | ProctorAlert::MultiplePeople
                | ProctorAlert::LookingLeft
                | ProctorAlert::LookingRight
        )
    }
}

pub fn classify_detections(detections: &FrameDetections) -> ProctorAlert {
    match detections.faces.as_slice() {
        [] => ProctorAlert::NoFace,
        [face] => {
            let width = if detections.frame_width > 0.0 {
                detections.frame_width
            } else {
                REFERENCE_WIDTH
            };
            let center = (face.origin_x + face.width / 2.0) * REFERENCE_WIDTH / width;
            if center < LEFT_LIMIT {
                ProctorAlert::LookingLeft
            } else if center > RIGHT_LIMIT {
                ProctorAlert::LookingRight
            } else {
                ProctorAlert::Ok
            }
        }
        _ => ProctorAlert::MultiplePeople,
    }
}

/// Classifies one encoded still frame. Undecodable frames and detector
/// failures both come back as `Invalid`.
pub async fn classify_frame(detector: &dyn FaceDetector, encoded: &str) -> ProctorAlert {
    let Some(image) = decode_frame(encoded) else {
        return ProctorAlert::Invalid;
    };

    match detector.detect(&image).await {
        Ok(detections) => classify_detections(&detections),
        Err(e) => {
            LOGGER.log_fallback("face_detector", None, &e.to_string());
            ProctorAlert::Invalid
        }
    }
}

/// Server frame on the proctoring websocket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProctorReply {
    pub alert: ProctorAlert,
    pub warning_count: u32,
    pub terminate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Escalation {
    pub count: u32,
    pub should_terminate: bool,
}

/// Violation counters of live interviews. A count is only committed once the
/// store has accepted it; callers serialize the `next_violation` / `commit`
/// pair of one interview.
#[derive(Debug)]
pub struct ProctoringTracker {
    counts: DashMap<i32, u32>,
    limit: u32,
}

impl ProctoringTracker {
    pub fn new(limit: u32) -> Self {
        Self {
            counts: DashMap::new(),
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Makes sure a counter exists, seeding it from the persisted count after a restart.
    pub fn seed(&self, interview_id: i32, persisted: u32) -> u32 {
        *self.counts.entry(interview_id).or_insert(persisted)
    }

    /// The escalation one more violation would cause. Records nothing.
    pub fn next_violation(&self, interview_id: i32, persisted: u32) -> Escalation {
        let current = self
            .current(interview_id)
            .map_or(persisted, |count| count.max(persisted));
        let count = current.saturating_add(1);
        Escalation {
            count,
            should_terminate: count >= self.limit,
        }
    }

    /// Stores a count the store has accepted. Counts never move backwards.
    pub fn commit(&self, interview_id: i32, count: u32) {
        self.counts
            .entry(interview_id)
            .and_modify(|current| *current = (*current).max(count))
            .or_insert(count);
    }

    /// Drops the counter of an interview that reached a terminal state.
    pub fn forget(&self, interview_id: i32) {
        self.counts.remove(&interview_id);
    }

    pub fn current(&self, interview_id: i32) -> Option<u32> {
        self.counts.get(&interview_id).map(|count| *count)
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.counts.len()
    }
}

/// Detector stub used by tests across the crate.
#[cfg(test)]
pub(crate) struct FixedDetector(pub Result<FrameDetections, ()>);

#[cfg(test)]
#[async_trait::async_trait]
impl FaceDetector for FixedDetector {
    async fn detect(
        &self,
        _image: &[u8],
    ) -> Result<FrameDetections, crate::clients::CollaboratorError> {
        self.0
            .clone()
            .map_err(|_| crate::clients::CollaboratorError::Transport("down".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clients::FaceBox;
    use base64ct::{Base64, Encoding};

    fn faces(frame_width: f64, boxes: &[(f64, f64)]) -> FrameDetections {
        FrameDetections {
            frame_width,
            faces: boxes
                .iter()
                .map(|&(origin_x, width)| FaceBox { origin_x, width })
                .collect(),
        }
    }

    #[test]
    fn classifies_face_count_and_gaze() {
        assert_eq!(classify_detections(&faces(640.0, &[])), ProctorAlert::NoFace);
        assert_eq!(
            classify_detections(&faces(640.0, &[(100.0, 80.0), (400.0, 80.0)])),
            ProctorAlert::MultiplePeople
        );
        assert_eq!(classify_detections(&faces(640.0, &[(20.0, 100.0)])), ProctorAlert::LookingLeft);
        assert_eq!(classify_detections(&faces(640.0, &[(480.0, 100.0)])), ProctorAlert::LookingRight);
        assert_eq!(classify_detections(&faces(640.0, &[(270.0, 100.0)])), ProctorAlert::Ok);
    }

    #[test]
    fn gaze_thresholds_scale_with_frame_width() {
        // Centre at 70px of a 320px frame is 140px at the reference width.
        assert_eq!(classify_detections(&faces(320.0, &[(45.0, 50.0)])), ProctorAlert::LookingLeft);
        assert_eq!(classify_detections(&faces(320.0, &[(135.0, 50.0)])), ProctorAlert::Ok);
    }

    #[test]
    fn alert_labels_match_wire_vocabulary() {
        let labels: Vec<String> = [
            ProctorAlert::Ok,
            ProctorAlert::NoFace,
            ProctorAlert::MultiplePeople,
            ProctorAlert::LookingLeft,
            ProctorAlert::LookingRight,
            ProctorAlert::Invalid,
        ]
        .iter()
        .map(|a| serde_json::to_value(a).unwrap().as_str().unwrap().to_string())
        .collect();
        assert_eq!(
            labels,
            ["OK", "NO_FACE", "MULTIPLE_PEOPLE", "LOOKING_LEFT", "LOOKING_RIGHT", "INVALID"]
        );
        assert!(!ProctorAlert::Invalid.is_violation());
        assert!(ProctorAlert::NoFace.is_violation());
    }

    #[tokio::test]
    async fn classify_frame_maps_bad_input_and_detector_failure_to_invalid() {
        let ok = FixedDetector(Ok(faces(640.0, &[(270.0, 100.0)])));
        assert_eq!(classify_frame(&ok, "data:image/png;base64,???").await, ProctorAlert::Invalid);

        let png = Base64::encode_string(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
        let frame = format!("data:image/png;base64,{}", png);
        assert_eq!(classify_frame(&ok, &frame).await, ProctorAlert::Ok);

        let down = FixedDetector(Err(()));
        assert_eq!(classify_frame(&down, &frame).await, ProctorAlert::Invalid);
    }

    #[test]
    fn third_committed_violation_requests_termination() {
        let tracker = ProctoringTracker::new(3);
        for expected in 1..=3 {
            let escalation = tracker.next_violation(9, 0);
            assert_eq!(escalation.count, expected);
            assert_eq!(escalation.should_terminate, expected == 3);
            tracker.commit(9, escalation.count);
        }
        assert_eq!(tracker.current(9), Some(3));
        assert_eq!(tracker.current(10), None);
    }

    #[test]
    fn uncommitted_violation_leaves_the_count_unchanged() {
        let tracker = ProctoringTracker::new(3);
        tracker.seed(5, 0);
        assert_eq!(tracker.next_violation(5, 0).count, 1);
        assert_eq!(tracker.next_violation(5, 0).count, 1);
        assert_eq!(tracker.current(5), Some(0));
    }

    #[test]
    fn counter_resumes_from_persisted_count() {
        let tracker = ProctoringTracker::new(3);
        let escalation = tracker.next_violation(4, 2);
        assert_eq!(escalation.count, 3);
        assert!(escalation.should_terminate);

        tracker.seed(6, 1);
        assert_eq!(tracker.next_violation(6, 2).count, 3);
    }

    #[test]
    fn forget_removes_the_counter() {
        let tracker = ProctoringTracker::new(3);
        tracker.commit(2, 1);
        tracker.forget(2);
        assert_eq!(tracker.current(2), None);
        assert_eq!(tracker.tracked(), 0);
    }

    #[test]
    fn concurrent_commits_keep_the_highest_count() {
        let tracker = Arc::new(ProctoringTracker::new(3));
        let handles: Vec<_> = (1..=8)
            .map(|count| {
                let tracker = tracker.clone();
                std::thread::spawn(move || tracker.commit(1, count))
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.current(1), Some(8));
    }
}
