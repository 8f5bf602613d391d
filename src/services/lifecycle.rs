// src/services/lifecycle.rs
//
// Transition rules for a trip. Every function here mutates only the trip it is
// handed; loading, locking and saving belong to the trip service.
use chrono::{DateTime, Utc};
use std::fmt;

use crate::{
    errors::HaulageError as AppError,
    models::{
        actor::Actor,
        driver::Driver,
        trip::{
            Dispute, DisputeOutcome, DisputeResolution, Evidence, EvidenceSubmission, RepriceRequest,
            Trip, TripStatus,
        },
    },
    services::pricing,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripAction {
    Accept,
    Reject,
    ConfirmPickup,
    ConfirmDelivery,
    RaiseDispute,
    ResolveDispute,
}

impl fmt::Display for TripAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TripAction::Accept => "accept",
            TripAction::Reject => "reject",
            TripAction::ConfirmPickup => "confirm pickup of",
            TripAction::ConfirmDelivery => "confirm delivery of",
            TripAction::RaiseDispute => "dispute",
            TripAction::ResolveDispute => "resolve a dispute on",
        })
    }
}

const VALID_TRANSITIONS: &[(TripStatus, TripAction, TripStatus)] = &[
    (TripStatus::Pending, TripAction::Accept, TripStatus::Accepted),
    (TripStatus::Pending, TripAction::Reject, TripStatus::Rejected),
    (TripStatus::Accepted, TripAction::ConfirmPickup, TripStatus::InTransit),
    (TripStatus::InTransit, TripAction::ConfirmDelivery, TripStatus::Delivered),
    // Disputes are a flag on a delivered trip, the principal state stays put
    (TripStatus::Delivered, TripAction::RaiseDispute, TripStatus::Delivered),
    (TripStatus::Delivered, TripAction::ResolveDispute, TripStatus::Delivered),
];

/// Whether a transition changed the trip or was a repeat of one already applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    Unchanged,
}

/// Returns the status `action` leads to from the trip's current state.
pub fn validate_transition(trip: &Trip, action: TripAction) -> Result<TripStatus, AppError> {
    let invalid = || AppError::InvalidTransition {
        from: trip.status_label().to_string(),
        action: action.to_string(),
    };

    let next = VALID_TRANSITIONS
        .iter()
        .find(|(from, candidate, _)| *from == trip.status && *candidate == action)
        .map(|(_, _, to)| *to)
        .ok_or_else(invalid)?;

    match action {
        TripAction::RaiseDispute if trip.is_disputed() => Err(invalid()),
        TripAction::ResolveDispute if !trip.is_disputed() => Err(invalid()),
        _ => Ok(next),
    }
}

pub fn accept(trip: &mut Trip, driver: &Driver, now: DateTime<Utc>) -> Result<TransitionOutcome, AppError> {
    // Assignment only decides the outcome while the trip sits in Accepted;
    // later statuses fall through to the transition table.
    if trip.status == TripStatus::Accepted {
        match trip.driver_id.as_deref() {
            Some(assigned) if assigned == driver.id => return Ok(TransitionOutcome::Unchanged),
            Some(_) => return Err(AppError::TripAlreadyAssigned),
            None => {}
        }
    }

    let next = validate_transition(trip, TripAction::Accept)?;

    if !driver.is_verified {
        return Err(AppError::DriverNotVerified);
    }
    if !driver.is_available {
        return Err(AppError::DriverNotAvailable);
    }
    if driver.capacity_kg < trip.weight_kg {
        return Err(AppError::DriverCapacityExceeded {
            capacity_kg: driver.capacity_kg,
            weight_kg: trip.weight_kg,
        });
    }

    trip.driver_id = Some(driver.id.clone());
    trip.status = next;
    trip.accepted_at = Some(now);
    trip.updated_at = now;
    Ok(TransitionOutcome::Applied)
}

pub fn reject(
    trip: &mut Trip,
    driver_id: &str,
    reason: Option<String>,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, AppError> {
    let next = validate_transition(trip, TripAction::Reject)?;

    trip.driver_id = None;
    trip.status = next;
    trip.rejected_by = Some(driver_id.to_string());
    trip.rejection_reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
    trip.rejected_at = Some(now);
    trip.updated_at = now;
    Ok(TransitionOutcome::Applied)
}

pub fn confirm_pickup(
    trip: &mut Trip,
    driver_id: &str,
    submission: &EvidenceSubmission,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, AppError> {
    if trip.status == TripStatus::InTransit
        && is_assigned(trip, driver_id)
        && matches_submission(trip.pickup_evidence.as_ref(), submission)
    {
        return Ok(TransitionOutcome::Unchanged);
    }

    let next = validate_transition(trip, TripAction::ConfirmPickup)?;
    ensure_assigned(trip, driver_id)?;
    let evidence = collect_evidence("pickup", submission, now)?;

    trip.pickup_evidence = Some(evidence);
    trip.status = next;
    trip.updated_at = now;
    Ok(TransitionOutcome::Applied)
}

pub fn confirm_delivery(
    trip: &mut Trip,
    driver_id: &str,
    submission: &EvidenceSubmission,
    variance_threshold: f64,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, AppError> {
    if trip.status == TripStatus::Delivered
        && is_assigned(trip, driver_id)
        && matches_submission(trip.delivery_evidence.as_ref(), submission)
    {
        return Ok(TransitionOutcome::Unchanged);
    }

    let next = validate_transition(trip, TripAction::ConfirmDelivery)?;
    ensure_assigned(trip, driver_id)?;
    let evidence = collect_evidence("delivery", submission, now)?;

    let baseline = trip
        .pickup_evidence
        .as_ref()
        .map(|pickup| pickup.weight_kg)
        .unwrap_or(trip.weight_kg);
    let exceeded = pricing::weight_variance(baseline, evidence.weight_kg)
        .map(|variance| (variance, pricing::exceeds_threshold(variance, variance_threshold)));

    if let Some((variance, true)) = exceeded {
        if !submission.confirm_variance {
            return Err(AppError::WeightVarianceUnconfirmed {
                variance,
                threshold: variance_threshold,
            });
        }
        tracing::warn!(
            "Trip {} delivered with {:.1}% weight variance, overridden by {}",
            trip.id,
            variance * 100.0,
            driver_id
        );
    }

    trip.variance_overridden = matches!(exceeded, Some((_, true)));
    trip.delivery_evidence = Some(evidence);
    trip.status = next;
    trip.payment_released = true;
    trip.payment_released_at = Some(now);
    trip.updated_at = now;
    Ok(TransitionOutcome::Applied)
}

pub fn raise_dispute(
    trip: &mut Trip,
    actor: &Actor,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, AppError> {
    let authorized = match actor {
        Actor::Admin(_) => true,
        Actor::CooperativeOfficer(cooperative_id) => *cooperative_id == trip.cooperative_id,
        Actor::Driver(driver_id) => is_assigned(trip, driver_id),
    };
    if !authorized {
        return Err(AppError::forbidden(format!("{} may not dispute trip {}", actor, trip.id)));
    }

    validate_transition(trip, TripAction::RaiseDispute)?;

    let reason = reason.trim();
    if reason.is_empty() {
        return Err(AppError::MissingRequiredField("reason".to_string()));
    }

    trip.disputes.push(Dispute {
        reason: reason.to_string(),
        raised_by: actor.to_string(),
        raised_at: now,
        outcome: None,
        resolved_by: None,
        resolved_at: None,
    });
    trip.updated_at = now;
    Ok(TransitionOutcome::Applied)
}

pub fn resolve_dispute(
    trip: &mut Trip,
    actor: &Actor,
    resolution: &DisputeResolution,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, AppError> {
    if !matches!(actor, Actor::Admin(_)) {
        return Err(AppError::forbidden("Only an admin may resolve disputes"));
    }

    validate_transition(trip, TripAction::ResolveDispute)?;

    let outcome = match resolution {
        DisputeResolution::Resolve => DisputeOutcome::Resolved,
        DisputeResolution::Reject { note } => {
            let note = note.trim();
            if note.is_empty() {
                return Err(AppError::MissingRequiredField("note".to_string()));
            }
            DisputeOutcome::Rejected { note: note.to_string() }
        }
    };

    let dispute = trip
        .disputes
        .last_mut()
        .ok_or_else(|| AppError::internal_error("open dispute vanished"))?;
    dispute.outcome = Some(outcome);
    dispute.resolved_by = Some(actor.to_string());
    dispute.resolved_at = Some(now);
    trip.updated_at = now;
    Ok(TransitionOutcome::Applied)
}

/// Rates may only change while nobody has committed to the trip.
pub fn reprice(trip: &mut Trip, rates: &RepriceRequest, now: DateTime<Utc>) -> Result<TransitionOutcome, AppError> {
    if trip.status != TripStatus::Pending || trip.driver_id.is_some() {
        return Err(AppError::PriceLocked(trip.id.clone()));
    }
    pricing::validate_rate("price_per_kg", rates.price_per_kg)?;
    pricing::validate_rate("price_per_km", rates.price_per_km)?;

    let pricing = &mut trip.pricing;
    if pricing.price_per_kg == rates.price_per_kg && pricing.price_per_km == rates.price_per_km {
        return Ok(TransitionOutcome::Unchanged);
    }
    pricing.price_per_kg = rates.price_per_kg;
    pricing.price_per_km = rates.price_per_km;
    pricing.total = pricing::total_price(pricing.weight_kg, rates.price_per_kg, pricing.distance_km, rates.price_per_km);
    pricing.locked_at = now;
    trip.updated_at = now;
    Ok(TransitionOutcome::Applied)
}

fn is_assigned(trip: &Trip, driver_id: &str) -> bool {
    trip.driver_id.as_deref() == Some(driver_id)
}

fn ensure_assigned(trip: &Trip, driver_id: &str) -> Result<(), AppError> {
    if is_assigned(trip, driver_id) {
        Ok(())
    } else {
        Err(AppError::forbidden(format!("Driver {} is not assigned to trip {}", driver_id, trip.id)))
    }
}

fn matches_submission(recorded: Option<&Evidence>, submission: &EvidenceSubmission) -> bool {
    match (recorded, submission.photo_uri.as_deref(), submission.weight_kg) {
        (Some(evidence), Some(photo), Some(weight)) => {
            evidence.photo_uri == photo.trim() && evidence.weight_kg == weight
        }
        _ => false,
    }
}

fn collect_evidence(stage: &str, submission: &EvidenceSubmission, now: DateTime<Utc>) -> Result<Evidence, AppError> {
    let photo_uri = submission
        .photo_uri
        .as_deref()
        .map(str::trim)
        .filter(|uri| !uri.is_empty())
        .ok_or_else(|| AppError::MissingEvidence(format!("{}_photo", stage)))?;

    let weight_kg = submission
        .weight_kg
        .ok_or_else(|| AppError::MissingEvidence(format!("{}_weight", stage)))?;
    if !weight_kg.is_finite() || weight_kg <= 0.0 {
        return Err(AppError::invalid_field(format!("{}_weight", stage), weight_kg, "must be a positive number"));
    }

    if let Some(gps) = submission.gps {
        if !gps.is_valid() {
            return Err(AppError::invalid_field(
                format!("{}_gps", stage),
                format!("{},{}", gps.latitude, gps.longitude),
                "coordinates out of range",
            ));
        }
    }

    Ok(Evidence {
        photo_uri: photo_uri.to_string(),
        weight_kg,
        gps: submission.gps,
        recorded_at: now,
    })
}
