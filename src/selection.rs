use crate::model::{Athlete, AthleteId};

/// The athlete the capture form is bound to. Capture is single-subject, so
/// selecting someone replaces whoever was selected before.
#[derive(Debug, Clone, Default)]
pub struct AthleteSelection {
    selected: Option<Athlete>,
}

impl AthleteSelection {
    pub fn select(&mut self, athlete: Athlete) -> Option<Athlete> {
        self.selected.replace(athlete)
    }

    pub fn clear(&mut self) -> Option<Athlete> {
        self.selected.take()
    }

    pub fn current(&self) -> Option<&Athlete> {
        self.selected.as_ref()
    }

    pub fn athlete_id(&self) -> Option<AthleteId> {
        self.selected.as_ref().map(|a| a.id)
    }
}
