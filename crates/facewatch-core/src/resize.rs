//! Map detection coordinates from the captured frame onto the display surface.

use crate::types::{Dimensions, FaceObservation};

/// Rescale observations from `source` frame coordinates to `target` display
/// coordinates. Equal dimensions return the observations untouched.
pub fn resize_observations(
    observations: Vec<FaceObservation>,
    source: Dimensions,
    target: Dimensions,
) -> Vec<FaceObservation> {
    if source == target || source.width == 0 || source.height == 0 {
        return observations;
    }

    let sx = target.width as f32 / source.width as f32;
    let sy = target.height as f32 / source.height as f32;

    observations.iter().map(|o| o.scaled(sx, sy)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, Descriptor, Detection, Landmarks};

    fn observation() -> FaceObservation {
        FaceObservation {
            detection: Detection {
                bbox: BoundingBox { x: 60.0, y: 30.0, width: 120.0, height: 90.0 },
                score: 0.87,
                keypoints: Some([(90.0, 60.0); 5]),
            },
            landmarks: Landmarks::new(vec![(100.0, 50.0), (140.0, 50.0)]),
            expressions: None,
            descriptor: Descriptor::new(vec![0.25, -0.5]),
        }
    }

    #[test]
    fn test_same_dimensions_is_identity() {
        let dims = Dimensions::new(300, 300);
        let resized = resize_observations(vec![observation()], dims, dims);
        assert_eq!(resized, vec![observation()]);
    }

    #[test]
    fn test_downscale_to_display() {
        let resized = resize_observations(
            vec![observation()],
            Dimensions::new(600, 300),
            Dimensions::new(300, 300),
        );
        let o = &resized[0];
        assert_eq!(o.detection.bbox, BoundingBox { x: 30.0, y: 30.0, width: 60.0, height: 90.0 });
        assert_eq!(o.detection.keypoints.unwrap()[2], (45.0, 60.0));
        assert_eq!(o.landmarks.points, vec![(50.0, 50.0), (70.0, 50.0)]);
        // Descriptor is coordinate-free and must not change.
        assert_eq!(o.descriptor, observation().descriptor);
    }

    #[test]
    fn test_zero_source_left_untouched() {
        let resized = resize_observations(
            vec![observation()],
            Dimensions::new(0, 0),
            Dimensions::new(300, 300),
        );
        assert_eq!(resized, vec![observation()]);
    }

    #[test]
    fn test_empty_input() {
        let resized = resize_observations(vec![], Dimensions::new(640, 480), Dimensions::new(300, 300));
        assert!(resized.is_empty());
    }
}
