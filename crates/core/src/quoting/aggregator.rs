//! Quote aggregation as a pure reducer.
//!
//! Every user event becomes a [`QuoteAction`]; [`reduce`] maps the current
//! [`QuoteState`] and an action to the next state plus any [`QuoteNotice`]s the
//! caller should surface. Actions that would break an invariant (locked line
//! edits, quantity below one) leave the state untouched and report why.

use serde::{Deserialize, Serialize};

use crate::domain::discount::{DiscountDescriptor, DiscountSource};
use crate::domain::line_item::{LineDraft, LineItemId, TreatmentLineItem};
use crate::domain::offer::SpecialOfferId;
use crate::domain::quote::QuoteState;
use crate::domain::treatment::Treatment;
use crate::quoting::catalog::ResolvedOffer;
use crate::quoting::package::PackageBundle;
use crate::quoting::pricing::{calculate_totals, QuoteTotals};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QuoteAction {
    AddTreatment { treatment: Treatment, quantity: u32 },
    RemoveTreatment { line_item_id: LineItemId },
    UpdateQuantity { line_item_id: LineItemId, quantity: u32 },
    SelectPackage(PackageBundle),
    ApplyOffer(ResolvedOffer),
    RemoveOffer,
    ApplyPromo { discount: DiscountDescriptor, via_offer: Option<SpecialOfferId> },
    RemovePromo,
    Reset,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoredReason {
    InvalidQuantity,
    LockedLineItem,
    UnknownLineItem,
    EmptyPackage,
    WrongDiscountSource,
    OfferNoLongerActive,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum QuoteNotice {
    Ignored { reason: IgnoredReason },
    PackageCleared { package_id: String },
    PromoCleared { code: String },
    OfferRemoved { offer_id: String },
    /// The offer carries a code and the promo slot is free; the caller should
    /// validate and apply it on the offer's behalf.
    EmbeddedPromoRequested { offer_id: String, code: String },
    /// The offer carries a code but the patient already entered a different
    /// one. The entered code is kept.
    OfferPromoConflict { offer_id: String, offer_code: String, current_code: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reduction {
    pub state: QuoteState,
    pub notices: Vec<QuoteNotice>,
}

impl Reduction {
    fn unchanged(state: &QuoteState, reason: IgnoredReason) -> Self {
        Self { state: state.clone(), notices: vec![QuoteNotice::Ignored { reason }] }
    }

    pub fn was_ignored(&self) -> bool {
        self.notices.iter().any(|notice| matches!(notice, QuoteNotice::Ignored { .. }))
    }
}

pub fn reduce(state: &QuoteState, action: QuoteAction) -> Reduction {
    match action {
        QuoteAction::AddTreatment { treatment, quantity } => add_treatment(state, &treatment, quantity),
        QuoteAction::RemoveTreatment { line_item_id } => remove_treatment(state, &line_item_id),
        QuoteAction::UpdateQuantity { line_item_id, quantity } => {
            update_quantity(state, &line_item_id, quantity)
        }
        QuoteAction::SelectPackage(bundle) => select_package(state, bundle),
        QuoteAction::ApplyOffer(offer) => apply_offer(state, offer),
        QuoteAction::RemoveOffer => {
            let mut next = state.clone();
            let notices = drop_offer(&mut next);
            Reduction { state: next, notices }
        }
        QuoteAction::ApplyPromo { discount, via_offer } => apply_promo(state, discount, via_offer),
        QuoteAction::RemovePromo => {
            let mut next = state.clone();
            next.discounts.clear(DiscountSource::PromoCode);
            next.promo_via_offer = None;
            Reduction { state: next, notices: Vec::new() }
        }
        QuoteAction::Reset => Reduction { state: QuoteState::default(), notices: Vec::new() },
    }
}

fn add_treatment(state: &QuoteState, treatment: &Treatment, quantity: u32) -> Reduction {
    if quantity < 1 {
        return Reduction::unchanged(state, IgnoredReason::InvalidQuantity);
    }

    let mut next = state.clone();
    let mut notices = Vec::new();
    if let Some(package_id) = next.active_package() {
        clear_package(&mut next);
        notices.push(QuoteNotice::PackageCleared { package_id: package_id.0 });
    }

    let existing = next
        .line_items
        .iter_mut()
        .find(|line| !line.is_locked() && line.treatment_id == treatment.id);
    match existing {
        Some(line) => {
            let Some(merged) = line.quantity().checked_add(quantity) else {
                return Reduction::unchanged(state, IgnoredReason::InvalidQuantity);
            };
            if line.set_quantity(merged).is_err() {
                return Reduction::unchanged(state, IgnoredReason::InvalidQuantity);
            }
        }
        None => {
            if push_line(&mut next, LineDraft::selected(treatment, quantity)).is_none() {
                return Reduction::unchanged(state, IgnoredReason::InvalidQuantity);
            }
        }
    }

    Reduction { state: next, notices }
}

fn remove_treatment(state: &QuoteState, line_item_id: &LineItemId) -> Reduction {
    let Some(position) = state.line_items.iter().position(|line| &line.id == line_item_id) else {
        return Reduction::unchanged(state, IgnoredReason::UnknownLineItem);
    };
    if state.line_items[position].is_locked() {
        return Reduction::unchanged(state, IgnoredReason::LockedLineItem);
    }

    let mut next = state.clone();
    next.line_items.remove(position);
    Reduction { state: next, notices: Vec::new() }
}

fn update_quantity(state: &QuoteState, line_item_id: &LineItemId, quantity: u32) -> Reduction {
    if quantity < 1 {
        return Reduction::unchanged(state, IgnoredReason::InvalidQuantity);
    }

    let mut next = state.clone();
    let Some(line) = next.line_items.iter_mut().find(|line| &line.id == line_item_id) else {
        return Reduction::unchanged(state, IgnoredReason::UnknownLineItem);
    };
    if line.is_locked() {
        return Reduction::unchanged(state, IgnoredReason::LockedLineItem);
    }
    if line.set_quantity(quantity).is_err() {
        return Reduction::unchanged(state, IgnoredReason::InvalidQuantity);
    }

    Reduction { state: next, notices: Vec::new() }
}

fn select_package(state: &QuoteState, bundle: PackageBundle) -> Reduction {
    if bundle.lines.is_empty() || bundle.discount.source != DiscountSource::Package {
        return Reduction::unchanged(state, IgnoredReason::EmptyPackage);
    }

    let mut next = state.clone();
    let mut notices = Vec::new();
    next.line_items.retain(|line| line.is_bonus());
    if let Some(previous) = next.discounts.clear(DiscountSource::Package) {
        if previous.source_id != bundle.package_id.0 {
            notices.push(QuoteNotice::PackageCleared { package_id: previous.source_id });
        }
    }
    if let Some(promo) = next.discounts.clear(DiscountSource::PromoCode) {
        next.promo_via_offer = None;
        notices.push(QuoteNotice::PromoCleared { code: promo.source_id });
    }

    for draft in bundle.lines {
        if push_line(&mut next, draft).is_none() {
            return Reduction::unchanged(state, IgnoredReason::EmptyPackage);
        }
    }
    next.discounts.install(bundle.discount);

    Reduction { state: next, notices }
}

fn apply_offer(state: &QuoteState, offer: ResolvedOffer) -> Reduction {
    if offer.discount.source != DiscountSource::SpecialOffer {
        return Reduction::unchanged(state, IgnoredReason::WrongDiscountSource);
    }

    let mut next = state.clone();
    if next.active_offer().as_ref() == Some(&offer.offer_id) {
        let notices = drop_offer(&mut next);
        return Reduction { state: next, notices };
    }

    let mut notices = drop_offer(&mut next);
    for draft in offer.bonus_lines {
        if push_line(&mut next, draft).is_none() {
            return Reduction::unchanged(state, IgnoredReason::InvalidQuantity);
        }
    }
    next.discounts.install(offer.discount);

    if let Some(code) = offer.promo_code {
        match next.promo_code() {
            None => notices.push(QuoteNotice::EmbeddedPromoRequested {
                offer_id: offer.offer_id.0.clone(),
                code,
            }),
            Some(current) if current.eq_ignore_ascii_case(&code) => {}
            Some(current) => notices.push(QuoteNotice::OfferPromoConflict {
                offer_id: offer.offer_id.0.clone(),
                offer_code: code,
                current_code: current.to_string(),
            }),
        }
    }

    Reduction { state: next, notices }
}

fn apply_promo(
    state: &QuoteState,
    discount: DiscountDescriptor,
    via_offer: Option<SpecialOfferId>,
) -> Reduction {
    if discount.source != DiscountSource::PromoCode {
        return Reduction::unchanged(state, IgnoredReason::WrongDiscountSource);
    }
    if let Some(offer_id) = &via_offer {
        if state.active_offer().as_ref() != Some(offer_id) {
            return Reduction::unchanged(state, IgnoredReason::OfferNoLongerActive);
        }
    }

    let mut next = state.clone();
    next.discounts.install(discount);
    next.promo_via_offer = via_offer;
    Reduction { state: next, notices: Vec::new() }
}

/// Removes the active offer, its bonus lines and any promo it installed.
fn drop_offer(state: &mut QuoteState) -> Vec<QuoteNotice> {
    let Some(offer_id) = state.active_offer() else {
        return Vec::new();
    };

    let mut notices = vec![QuoteNotice::OfferRemoved { offer_id: offer_id.0.clone() }];
    state.discounts.clear(DiscountSource::SpecialOffer);
    state.line_items.retain(|line| !line.is_bonus_of(&offer_id));
    if state.promo_via_offer.as_ref() == Some(&offer_id) {
        state.promo_via_offer = None;
        if let Some(promo) = state.discounts.clear(DiscountSource::PromoCode) {
            notices.push(QuoteNotice::PromoCleared { code: promo.source_id });
        }
    }
    notices
}

fn clear_package(state: &mut QuoteState) {
    state.discounts.clear(DiscountSource::Package);
    state.line_items.retain(|line| !line.is_package());
}

fn push_line(state: &mut QuoteState, draft: LineDraft) -> Option<()> {
    let id = state.next_line_id();
    let line = TreatmentLineItem::new(id, draft).ok()?;
    state.line_items.push(line);
    Some(())
}

/// Owning wrapper around [`reduce`] for callers that keep a single quote.
#[derive(Clone, Debug, Default)]
pub struct QuoteAggregator {
    state: QuoteState,
}

impl QuoteAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: QuoteState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &QuoteState {
        &self.state
    }

    pub fn into_state(self) -> QuoteState {
        self.state
    }

    pub fn dispatch(&mut self, action: QuoteAction) -> Vec<QuoteNotice> {
        let Reduction { state, notices } = reduce(&self.state, action);
        self.state = state;
        notices
    }

    pub fn add_treatment(&mut self, treatment: &Treatment, quantity: u32) -> Vec<QuoteNotice> {
        self.dispatch(QuoteAction::AddTreatment { treatment: treatment.clone(), quantity })
    }

    pub fn remove_treatment(&mut self, line_item_id: &LineItemId) -> Vec<QuoteNotice> {
        self.dispatch(QuoteAction::RemoveTreatment { line_item_id: line_item_id.clone() })
    }

    pub fn update_quantity(&mut self, line_item_id: &LineItemId, quantity: u32) -> Vec<QuoteNotice> {
        self.dispatch(QuoteAction::UpdateQuantity { line_item_id: line_item_id.clone(), quantity })
    }

    pub fn select_package(&mut self, bundle: PackageBundle) -> Vec<QuoteNotice> {
        self.dispatch(QuoteAction::SelectPackage(bundle))
    }

    pub fn apply_offer(&mut self, offer: ResolvedOffer) -> Vec<QuoteNotice> {
        self.dispatch(QuoteAction::ApplyOffer(offer))
    }

    pub fn remove_offer(&mut self) -> Vec<QuoteNotice> {
        self.dispatch(QuoteAction::RemoveOffer)
    }

    pub fn apply_promo(&mut self, discount: DiscountDescriptor) -> Vec<QuoteNotice> {
        self.dispatch(QuoteAction::ApplyPromo { discount, via_offer: None })
    }

    pub fn remove_promo_code(&mut self) -> Vec<QuoteNotice> {
        self.dispatch(QuoteAction::RemovePromo)
    }

    pub fn reset(&mut self) {
        self.dispatch(QuoteAction::Reset);
    }

    pub fn calculate_totals(&self) -> QuoteTotals {
        calculate_totals(&self.state)
    }
}
