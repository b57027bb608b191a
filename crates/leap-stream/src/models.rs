//! Pose-frame data model, matching the sensor host's JSON wire format.
//!
//! Vector components arrive as flat scalar fields (`tip_x`, `tip_y`, ...);
//! the accessors regroup them into triples. An absent `left_arm`/`right_arm`
//! object means that arm is not tracked this frame. All vectors are in
//! sensor space until [`PoseFrame::transform`] maps them into camera space.

use leap_calib::CalibrationTransform;
use serde::{Deserialize, Serialize};

/// Finger identity, decoded from the numeric `type` field on the wire.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FingerType {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl FingerType {
    pub fn from_wire(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Thumb),
            1 => Some(Self::Index),
            2 => Some(Self::Middle),
            3 => Some(Self::Ring),
            4 => Some(Self::Pinky),
            _ => None,
        }
    }

    pub fn to_wire(self) -> i32 {
        match self {
            Self::Thumb => 0,
            Self::Index => 1,
            Self::Middle => 2,
            Self::Ring => 3,
            Self::Pinky => 4,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FingerData {
    #[serde(rename = "type")]
    pub finger_type: i32,
    pub direction_x: f32,
    pub direction_y: f32,
    pub direction_z: f32,
    pub is_extended: bool,
    pub tip_x: f32,
    pub tip_y: f32,
    pub tip_z: f32,
    pub stabilized_tip_x: f32,
    pub stabilized_tip_y: f32,
    pub stabilized_tip_z: f32,
    pub tip_velocity_x: f32,
    pub tip_velocity_y: f32,
    pub tip_velocity_z: f32,
}

impl FingerData {
    pub fn kind(&self) -> Option<FingerType> {
        FingerType::from_wire(self.finger_type)
    }

    pub fn tip_position(&self) -> [f32; 3] {
        [self.tip_x, self.tip_y, self.tip_z]
    }

    pub fn stabilized_tip_position(&self) -> [f32; 3] {
        [
            self.stabilized_tip_x,
            self.stabilized_tip_y,
            self.stabilized_tip_z,
        ]
    }

    pub fn direction(&self) -> [f32; 3] {
        [self.direction_x, self.direction_y, self.direction_z]
    }

    pub fn tip_velocity(&self) -> [f32; 3] {
        [self.tip_velocity_x, self.tip_velocity_y, self.tip_velocity_z]
    }

    fn transform(&mut self, calib: &CalibrationTransform) {
        [self.tip_x, self.tip_y, self.tip_z] = calib.apply_array(self.tip_position());
        [
            self.stabilized_tip_x,
            self.stabilized_tip_y,
            self.stabilized_tip_z,
        ] = calib.apply_array(self.stabilized_tip_position());
        [self.direction_x, self.direction_y, self.direction_z] =
            calib.apply_array(self.direction());
        [self.tip_velocity_x, self.tip_velocity_y, self.tip_velocity_z] =
            calib.apply_array(self.tip_velocity());
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HandData {
    pub palm_x: f32,
    pub palm_y: f32,
    pub palm_z: f32,
    pub stabilized_palm_x: f32,
    pub stabilized_palm_y: f32,
    pub stabilized_palm_z: f32,
    pub palm_normal_x: f32,
    pub palm_normal_y: f32,
    pub palm_normal_z: f32,
    pub palm_velocity_x: f32,
    pub palm_velocity_y: f32,
    pub palm_velocity_z: f32,
    pub palm_to_fingers_x: f32,
    pub palm_to_fingers_y: f32,
    pub palm_to_fingers_z: f32,
    pub fingers: Vec<FingerData>,
    pub grab_angle: f32,
    pub pinch_distance: f32,
}

impl HandData {
    pub fn palm_position(&self) -> [f32; 3] {
        [self.palm_x, self.palm_y, self.palm_z]
    }

    pub fn stabilized_palm_position(&self) -> [f32; 3] {
        [
            self.stabilized_palm_x,
            self.stabilized_palm_y,
            self.stabilized_palm_z,
        ]
    }

    pub fn palm_normal(&self) -> [f32; 3] {
        [self.palm_normal_x, self.palm_normal_y, self.palm_normal_z]
    }

    pub fn palm_velocity(&self) -> [f32; 3] {
        [
            self.palm_velocity_x,
            self.palm_velocity_y,
            self.palm_velocity_z,
        ]
    }

    pub fn palm_to_fingers_direction(&self) -> [f32; 3] {
        [
            self.palm_to_fingers_x,
            self.palm_to_fingers_y,
            self.palm_to_fingers_z,
        ]
    }

    /// Look a finger up by identity. Fingers arrive in no guaranteed order.
    pub fn finger(&self, kind: FingerType) -> Option<&FingerData> {
        self.fingers.iter().find(|f| f.kind() == Some(kind))
    }

    fn transform(&mut self, calib: &CalibrationTransform) {
        for finger in &mut self.fingers {
            finger.transform(calib);
        }
        [self.palm_x, self.palm_y, self.palm_z] = calib.apply_array(self.palm_position());
        [
            self.stabilized_palm_x,
            self.stabilized_palm_y,
            self.stabilized_palm_z,
        ] = calib.apply_array(self.stabilized_palm_position());
        [self.palm_normal_x, self.palm_normal_y, self.palm_normal_z] =
            calib.apply_array(self.palm_normal());
        [
            self.palm_velocity_x,
            self.palm_velocity_y,
            self.palm_velocity_z,
        ] = calib.apply_array(self.palm_velocity());
        [
            self.palm_to_fingers_x,
            self.palm_to_fingers_y,
            self.palm_to_fingers_z,
        ] = calib.apply_array(self.palm_to_fingers_direction());
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ForearmData {
    pub wrist_x: f32,
    pub wrist_y: f32,
    pub wrist_z: f32,
    pub direction_x: f32,
    pub direction_y: f32,
    pub direction_z: f32,
    pub elbow_x: f32,
    pub elbow_y: f32,
    pub elbow_z: f32,
}

impl ForearmData {
    pub fn wrist_position(&self) -> [f32; 3] {
        [self.wrist_x, self.wrist_y, self.wrist_z]
    }

    pub fn direction(&self) -> [f32; 3] {
        [self.direction_x, self.direction_y, self.direction_z]
    }

    pub fn elbow_position(&self) -> [f32; 3] {
        [self.elbow_x, self.elbow_y, self.elbow_z]
    }

    fn transform(&mut self, calib: &CalibrationTransform) {
        [self.wrist_x, self.wrist_y, self.wrist_z] = calib.apply_array(self.wrist_position());
        [self.direction_x, self.direction_y, self.direction_z] =
            calib.apply_array(self.direction());
        [self.elbow_x, self.elbow_y, self.elbow_z] = calib.apply_array(self.elbow_position());
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ArmData {
    pub forearm: ForearmData,
    pub hand: HandData,
}

impl ArmData {
    fn transform(&mut self, calib: &CalibrationTransform) {
        self.forearm.transform(calib);
        self.hand.transform(calib);
    }
}

/// One snapshot of tracked arm/hand geometry from the sensor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_arm: Option<ArmData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_arm: Option<ArmData>,
}

impl PoseFrame {
    /// Map every vector of the frame into camera space.
    pub fn transform(&mut self, calib: &CalibrationTransform) {
        if let Some(arm) = &mut self.left_arm {
            arm.transform(calib);
        }
        if let Some(arm) = &mut self.right_arm {
            arm.transform(calib);
        }
    }
}
