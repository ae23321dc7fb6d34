//! Parameter sets for the compute form.
//!
//! A `ParameterSet` is an ordered list of numeric controls, each with a valid
//! range, plus editable plot labels. Cross-field constraints are applied by
//! the pure function [`clamp`] after every change, so callers can never
//! observe a set where `penalty order >= degree`.

use crate::domain::FitMethod;
use crate::error::FitError;

/// Named numeric controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKey {
    Degree,
    PenaltyOrder,
    Count,
    LambdaVariance,
    ErrorVariance,
    Threshold1,
    Threshold2,
}

impl ParamKey {
    pub fn label(self) -> &'static str {
        match self {
            ParamKey::Degree => "Degree of bases",
            ParamKey::PenaltyOrder => "Order of penalty",
            ParamKey::Count => "Number of observations",
            ParamKey::LambdaVariance => "Lambda variance",
            ParamKey::ErrorVariance => "Error variance",
            ParamKey::Threshold1 => "Scaling threshold 1",
            ParamKey::Threshold2 => "Scaling threshold 2",
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, ParamKey::Degree | ParamKey::PenaltyOrder | ParamKey::Count)
    }

    /// Increment used by keyboard adjustment.
    pub fn step(self) -> f64 {
        match self {
            ParamKey::Degree | ParamKey::PenaltyOrder => 1.0,
            ParamKey::Count => 10.0,
            ParamKey::LambdaVariance | ParamKey::ErrorVariance => 0.01,
            ParamKey::Threshold1 | ParamKey::Threshold2 => 0.1,
        }
    }
}

/// One control: current value and valid range (inclusive).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Control {
    pub key: ParamKey,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

impl Control {
    fn new(key: ParamKey, value: f64, min: f64, max: f64) -> Self {
        Self { key, value, min, max }
    }
}

/// Title and axis labels for one plot panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelLabels {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
}

impl PanelLabels {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            x_label: "Time".to_string(),
            y_label: "Thickness Change (m)".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSet {
    method: FitMethod,
    controls: Vec<Control>,
    labels: Vec<PanelLabels>,
}

impl ParameterSet {
    /// Default controls and labels for a method.
    pub fn preset(method: FitMethod) -> Self {
        use ParamKey::*;

        let base = |degree: f64, order: f64, count: f64| {
            vec![
                Control::new(Degree, degree, 2.0, 5.0),
                Control::new(PenaltyOrder, order, 1.0, degree - 1.0),
                Control::new(Count, count, 1.0, 9999.0),
            ]
        };

        let (controls, labels) = match method {
            FitMethod::Gcv => (base(4.0, 2.0, 200.0), vec![PanelLabels::new("GCV-fitted ALPS")]),
            FitMethod::Reml => {
                let mut c = base(5.0, 2.0, 200.0);
                c.push(Control::new(LambdaVariance, 0.1, 0.0, f64::INFINITY));
                c.push(Control::new(ErrorVariance, 0.1, 0.0, f64::INFINITY));
                (c, vec![PanelLabels::new("REML-fitted ALPS")])
            }
            FitMethod::TwoStage => {
                let mut c = base(4.0, 2.0, 300.0);
                c.push(Control::new(Threshold1, 3.0, 0.0, f64::INFINITY));
                c.push(Control::new(Threshold2, 1.2, 0.0, f64::INFINITY));
                (c, vec![PanelLabels::new("One-step"), PanelLabels::new("Two-step")])
            }
            FitMethod::Mmf => {
                let mut c = base(4.0, 3.0, 200.0);
                c.push(Control::new(LambdaVariance, 0.1, 0.0, f64::INFINITY));
                c.push(Control::new(ErrorVariance, 0.1, 0.0, f64::INFINITY));
                (c, vec![PanelLabels::new("REML"), PanelLabels::new("Split Frequency")])
            }
        };

        clamp(Self {
            method,
            controls,
            labels,
        })
    }

    pub fn method(&self) -> FitMethod {
        self.method
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    pub fn control(&self, key: ParamKey) -> Option<&Control> {
        self.controls.iter().find(|c| c.key == key)
    }

    pub fn value(&self, key: ParamKey) -> Option<f64> {
        self.control(key).map(|c| c.value)
    }

    /// Value of a control the caller needs; missing controls are a parameter error.
    pub fn require(&self, key: ParamKey) -> Result<f64, FitError> {
        self.value(key).ok_or_else(|| {
            FitError::InvalidParameter(format!(
                "'{}' is not a parameter of the {} form",
                key.label(),
                self.method.display_name()
            ))
        })
    }

    /// Integer control as `usize`.
    pub fn require_whole(&self, key: ParamKey) -> Result<usize, FitError> {
        let v = self.require(key)?;
        if v < 0.0 || v.fract() != 0.0 {
            return Err(FitError::InvalidParameter(format!(
                "'{}' must be a non-negative integer, got {v}",
                key.label()
            )));
        }
        Ok(v as usize)
    }

    pub fn labels(&self) -> &[PanelLabels] {
        &self.labels
    }

    pub fn labels_mut(&mut self) -> &mut [PanelLabels] {
        &mut self.labels
    }

    /// Labels for panel `idx`, falling back to the method defaults.
    pub fn panel_labels(&self, idx: usize) -> PanelLabels {
        self.labels
            .get(idx)
            .cloned()
            .unwrap_or_else(|| PanelLabels::new(self.method.display_name()))
    }

    /// Set one control and re-apply every constraint.
    ///
    /// Integer controls are rounded; values are clamped to the control's range.
    /// Returns the value actually stored.
    pub fn set(&mut self, key: ParamKey, value: f64) -> Result<f64, FitError> {
        if !value.is_finite() {
            return Err(FitError::InvalidParameter(format!(
                "'{}' must be finite, got {value}",
                key.label()
            )));
        }
        let mut next = self.clone();
        let Some(control) = next.controls.iter_mut().find(|c| c.key == key) else {
            return Err(FitError::InvalidParameter(format!(
                "'{}' is not a parameter of the {} form",
                key.label(),
                self.method.display_name()
            )));
        };
        control.value = if key.is_integer() { value.round() } else { value };

        *self = clamp(next);
        self.require(key)
    }

    /// Move a control by `steps` increments.
    pub fn adjust(&mut self, key: ParamKey, steps: i32) -> Result<f64, FitError> {
        let current = self.require(key)?;
        self.set(key, current + key.step() * steps as f64)
    }
}

/// Apply range and cross-field constraints.
///
/// - every value is clamped into its `[min, max]`
/// - the penalty order's upper bound is `degree - 1`, and a larger stored
///   order is lowered to it
pub fn clamp(mut params: ParameterSet) -> ParameterSet {
    for c in &mut params.controls {
        c.value = clamp_value(c.value, c.min, c.max);
    }

    if let Some(degree) = params.value(ParamKey::Degree) {
        if let Some(order) = params
            .controls
            .iter_mut()
            .find(|c| c.key == ParamKey::PenaltyOrder)
        {
            order.max = (degree - 1.0).max(order.min);
            order.value = clamp_value(order.value, order.min, order.max);
        }
    }

    params
}

fn clamp_value(value: f64, min: f64, max: f64) -> f64 {
    if min > max {
        return min;
    }
    value.clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_match_method_defaults() {
        let gcv = ParameterSet::preset(FitMethod::Gcv);
        assert_eq!(gcv.value(ParamKey::Degree), Some(4.0));
        assert_eq!(gcv.value(ParamKey::PenaltyOrder), Some(2.0));
        assert_eq!(gcv.value(ParamKey::Count), Some(200.0));
        assert_eq!(gcv.value(ParamKey::LambdaVariance), None);

        let two = ParameterSet::preset(FitMethod::TwoStage);
        assert_eq!(two.value(ParamKey::Count), Some(300.0));
        assert_eq!(two.value(ParamKey::Threshold1), Some(3.0));
        assert_eq!(two.value(ParamKey::Threshold2), Some(1.2));
        assert_eq!(two.labels().len(), 2);

        let mmf = ParameterSet::preset(FitMethod::Mmf);
        assert_eq!(mmf.value(ParamKey::PenaltyOrder), Some(3.0));
        assert_eq!(mmf.control(ParamKey::PenaltyOrder).unwrap().max, 3.0);
    }

    #[test]
    fn order_upper_bound_tracks_degree() {
        for method in FitMethod::ALL {
            let mut params = ParameterSet::preset(method);
            for degree in [5.0, 2.0, 3.0, 4.0, 5.0] {
                params.set(ParamKey::PenaltyOrder, 4.0).unwrap();
                params.set(ParamKey::Degree, degree).unwrap();
                let order = params.control(ParamKey::PenaltyOrder).unwrap();
                assert_eq!(order.max, degree - 1.0);
                assert!(order.value <= degree - 1.0);
            }
        }
    }

    #[test]
    fn lowering_degree_lowers_order() {
        let mut params = ParameterSet::preset(FitMethod::Mmf);
        assert_eq!(params.value(ParamKey::PenaltyOrder), Some(3.0));
        params.set(ParamKey::Degree, 3.0).unwrap();
        assert_eq!(params.value(ParamKey::PenaltyOrder), Some(2.0));
        // Raising again widens the bound but keeps the lowered value.
        params.set(ParamKey::Degree, 5.0).unwrap();
        assert_eq!(params.value(ParamKey::PenaltyOrder), Some(2.0));
        assert_eq!(params.control(ParamKey::PenaltyOrder).unwrap().max, 4.0);
    }

    #[test]
    fn set_rounds_and_clamps() {
        let mut params = ParameterSet::preset(FitMethod::Gcv);
        assert_eq!(params.set(ParamKey::Count, 12.6).unwrap(), 13.0);
        assert_eq!(params.set(ParamKey::Count, 1e9).unwrap(), 9999.0);
        assert_eq!(params.set(ParamKey::Degree, 0.0).unwrap(), 2.0);
        assert!(params.set(ParamKey::Count, f64::NAN).is_err());
        assert!(params.set(ParamKey::Threshold1, 1.0).is_err());
    }

    #[test]
    fn adjust_steps_by_key_increment() {
        let mut params = ParameterSet::preset(FitMethod::Reml);
        assert_eq!(params.adjust(ParamKey::Count, 2).unwrap(), 220.0);
        let v = params.adjust(ParamKey::ErrorVariance, -1).unwrap();
        assert!((v - 0.09).abs() < 1e-12);
        assert_eq!(params.adjust(ParamKey::Degree, 3).unwrap(), 5.0);
    }

    #[test]
    fn clamp_is_idempotent() {
        let once = clamp(ParameterSet::preset(FitMethod::TwoStage));
        assert_eq!(clamp(once.clone()), once);
    }
}
