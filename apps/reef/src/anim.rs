//! Camera animation playback.
//!
//! Text format: an optional leading record `<mx> <my> <mz>` with the
//! model rotation, then whitespace-separated records
//! `<frame> <tx> <ty> <tz> <rx> <ry> <rz>`. Playback interpolates
//! linearly between records and wraps at the end.

use std::path::Path;

use glam::Vec3;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnimationError {
    #[error("failed to read animation file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed animation value {value:?} at token {index}")]
    Parse { index: usize, value: String },
    #[error("animation record truncated at token {0}")]
    Truncated(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub frame: i32,
    pub translation: Vec3,
    pub rotation: Vec3,
}

impl Default for Step {
    fn default() -> Self {
        Self {
            frame: 0,
            translation: Vec3::new(0.0, 0.0, -1.0),
            rotation: Vec3::ZERO,
        }
    }
}

#[derive(Debug, Default)]
pub struct CameraAnimation {
    model_rotation: Vec3,
    steps: Vec<Step>,
    cur_step: usize,
    cur_frame: i32,
}

impl CameraAnimation {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AnimationError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, AnimationError> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let mut values = Vec::with_capacity(tokens.len());
        for (index, token) in tokens.iter().enumerate() {
            let value: f32 = token.parse().map_err(|_| AnimationError::Parse {
                index,
                value: token.to_string(),
            })?;
            values.push(value);
        }

        if values.is_empty() {
            return Ok(Self::default());
        }

        // The model-rotation header is optional. Records are 7 values
        // each, so the total count disambiguates: a multiple of 7 is
        // header-less, a remainder of 3 starts with the header.
        let (model_rotation, records) = match values.len() % 7 {
            0 => (Vec3::ZERO, &values[..]),
            3 => (Vec3::new(values[0], values[1], values[2]), &values[3..]),
            _ => return Err(AnimationError::Truncated(values.len())),
        };

        let steps = records
            .chunks_exact(7)
            .map(|record| Step {
                frame: record[0] as i32,
                translation: Vec3::new(record[1], record[2], record[3]),
                rotation: Vec3::new(record[4], record[5], record[6]),
            })
            .collect();

        Ok(Self {
            model_rotation,
            steps,
            cur_step: 0,
            cur_frame: 0,
        })
    }

    pub fn is_valid(&self) -> bool {
        !self.steps.is_empty()
    }

    pub fn model_rotation(&self) -> Vec3 {
        self.model_rotation
    }

    /// Advance one frame and return the interpolated camera step.
    pub fn next_step(&mut self) -> Step {
        if self.steps.is_empty() {
            return Step::default();
        }
        if self.cur_frame < self.steps[0].frame {
            self.cur_frame = self.steps[0].frame;
        } else {
            self.cur_frame += 1;
        }

        while self.cur_step + 1 < self.steps.len()
            && self.cur_frame > self.steps[self.cur_step + 1].frame
        {
            self.cur_step += 1;
        }
        if self.cur_step + 1 >= self.steps.len() {
            // Past the last record: wrap to the start.
            self.cur_step = 0;
            self.cur_frame = self.steps[0].frame;
            return self.steps[0];
        }

        let from = self.steps[self.cur_step];
        let to = self.steps[self.cur_step + 1];
        let span = (to.frame - from.frame).max(1);
        let t = (self.cur_frame - from.frame) as f32 / span as f32;
        Step {
            frame: self.cur_frame,
            translation: from.translation.lerp(to.translation, t),
            rotation: from.rotation.lerp(to.rotation, t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANIMATION: &str = "\
0.0 1.0 0.0
0  0.0 0.0 -1.0  0.0 0.0 0.0
10 1.0 0.0 -1.0  0.0 90.0 0.0
";

    #[test]
    fn parses_header_and_records() {
        let animation = CameraAnimation::parse(ANIMATION).expect("parse");
        assert!(animation.is_valid());
        assert_eq!(animation.model_rotation(), Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(animation.steps.len(), 2);
    }

    #[test]
    fn interpolates_between_records() {
        let mut animation = CameraAnimation::parse(ANIMATION).expect("parse");
        let mut step = animation.next_step();
        for _ in 0..4 {
            step = animation.next_step();
        }
        // Frame 5 of 10: halfway between the records.
        assert_eq!(step.frame, 5);
        assert!((step.translation.x - 0.5).abs() < 1e-6);
        assert!((step.rotation.y - 45.0).abs() < 1e-6);
    }

    #[test]
    fn wraps_after_the_last_record() {
        let mut animation = CameraAnimation::parse(ANIMATION).expect("parse");
        for _ in 0..10 {
            animation.next_step();
        }
        let step = animation.next_step();
        assert_eq!(step.frame, 0);
        assert_eq!(step.translation, Vec3::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn header_is_optional() {
        let mut animation =
            CameraAnimation::parse("0 0.0 0.0 -1.0 0.0 0.0 0.0").expect("parse");
        assert!(animation.is_valid());
        assert_eq!(animation.model_rotation(), Vec3::ZERO);
        assert_eq!(animation.steps.len(), 1);
        let step = animation.next_step();
        assert_eq!(step.translation, Vec3::new(0.0, 0.0, -1.0));

        // Header with no records parses but has nothing to play.
        let empty = CameraAnimation::parse("0.5 1.0 0.0").expect("parse");
        assert!(!empty.is_valid());
        assert_eq!(empty.model_rotation(), Vec3::new(0.5, 1.0, 0.0));
    }

    #[test]
    fn rejects_truncated_records() {
        assert!(matches!(
            CameraAnimation::parse("0 0 0 1 2 3"),
            Err(AnimationError::Truncated(_))
        ));
        assert!(matches!(
            CameraAnimation::parse("0 0 zero"),
            Err(AnimationError::Parse { .. })
        ));
    }

    #[test]
    fn empty_input_is_an_empty_animation() {
        let mut animation = CameraAnimation::parse("").expect("parse");
        assert!(!animation.is_valid());
        assert_eq!(animation.next_step().frame, 0);
    }
}
