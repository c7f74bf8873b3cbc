// In-memory store implementing every repository trait, used by the unit and
// router tests. One lock guards all tables so multi-row writes are atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use crate::activity_log::{ActivityLogEntry, ActivityLogRepository};
use crate::auth::models::{NewUser, User};
use crate::auth::UserRepository;
use crate::blocks::allocation;
use crate::blocks::models::{
    AssignOutcome, Assignment, Block, BlockState, BlockType, Booking, BookingContext,
    BookingStatus, CancellationPlan, Event, EventCategory, EventType, FreeClassAction, NewBlock,
    SystemBlockType,
};
use crate::blocks::BlockRepository;
use crate::content::models::{DisclaimerContent, PolicyDocument, PolicyKind};
use crate::content::ContentRepository;
use crate::db::StoreError;
use crate::disclaimers::lifecycle::VALIDITY_DAYS;
use crate::disclaimers::models::{
    ArchivedDisclaimer, NewArchivedDisclaimer, NewNonRegisteredDisclaimer, NewOnlineDisclaimer,
    NonRegisteredDisclaimer, OnlineDisclaimer, PrintDisclaimer, SweepSelection,
};
use crate::disclaimers::repository::DisclaimerRepository;
use crate::mailing_list::GroupRepository;
use crate::vouchers::models::{
    NewVoucher, PaidItem, Redemption, RedemptionOutcome, UnpaidItem, UsageCounts, UsedVoucher,
    Voucher, VoucherKind,
};
use crate::vouchers::{rules, VoucherRepository};

#[derive(Default)]
struct Tables {
    next_id: i32,
    users: BTreeMap<i32, User>,
    groups: BTreeMap<String, Vec<i32>>,
    activity: Vec<ActivityLogEntry>,
    disclaimer_content: Vec<DisclaimerContent>,
    policies: Vec<(PolicyKind, PolicyDocument)>,
    online: BTreeMap<i32, OnlineDisclaimer>,
    print: BTreeMap<i32, PrintDisclaimer>,
    non_registered: BTreeMap<i32, NonRegisteredDisclaimer>,
    archived: BTreeMap<i32, ArchivedDisclaimer>,
    event_types: BTreeMap<i32, EventType>,
    events: BTreeMap<i32, Event>,
    block_types: BTreeMap<i32, BlockType>,
    blocks: BTreeMap<i32, Block>,
    bookings: BTreeMap<i32, Booking>,
    vouchers: BTreeMap<i32, Voucher>,
    used_vouchers: Vec<UsedVoucher>,
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn email_taken(&self, email: &str, except: Option<i32>) -> bool {
        self.users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(email) && Some(u.id) != except)
    }

    fn block_state(&self, block: &Block) -> Result<BlockState, StoreError> {
        let block_type = self
            .block_types
            .get(&block.block_type_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("block type {}", block.block_type_id)))?;
        Ok(BlockState {
            block: block.clone(),
            block_type,
            bookings_made: self.bookings_on(block.id) as i64,
        })
    }

    fn bookings_on(&self, block_id: i32) -> usize {
        self.bookings
            .values()
            .filter(|b| b.block_id == Some(block_id))
            .count()
    }

    fn insert_block(&mut self, new: &NewBlock) -> Option<Block> {
        if let Some(parent_id) = new.parent_id {
            if self.blocks.values().any(|b| b.parent_id == Some(parent_id)) {
                return None;
            }
        }
        let block = Block {
            id: self.next_id(),
            user_id: new.user_id,
            block_type_id: new.block_type_id,
            start_date: new.start_date,
            expiry_date: new.expiry_date,
            paid: new.paid,
            parent_id: new.parent_id,
            transferred_booking_id: new.transferred_booking_id,
        };
        self.blocks.insert(block.id, block.clone());
        Some(block)
    }

    fn archive(&mut self, archive: &NewArchivedDisclaimer) {
        let id = self.next_id();
        self.archived.insert(
            id,
            ArchivedDisclaimer {
                id,
                date: archive.date,
                date_updated: archive.date_updated,
                date_archived: archive.date_archived,
                event_date: archive.event_date,
                version: archive.version,
                details: archive.details.clone(),
            },
        );
    }

    fn usage(&self, voucher_id: i32, user_id: i32) -> UsageCounts {
        let used = self.used_vouchers.iter().filter(|u| u.voucher_id == voucher_id);
        let (total, by_user) = used.fold((0, 0), |(total, by_user), u| {
            (total + 1, by_user + i64::from(u.user_id == user_id))
        });
        UsageCounts { total, by_user }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activity log lines in insertion order
    pub async fn activity_entries(&self) -> Vec<String> {
        let tables = self.tables.lock().await;
        tables.activity.iter().map(|e| e.log.clone()).collect()
    }

    pub async fn add_event_type(&self, category: EventCategory, subtype: &str) -> EventType {
        let mut tables = self.tables.lock().await;
        let event_type = EventType {
            id: tables.next_id(),
            category,
            subtype: subtype.to_string(),
        };
        tables.event_types.insert(event_type.id, event_type.clone());
        event_type
    }

    pub async fn add_event(&self, event_type_id: i32, cost: Decimal, date: DateTime<Utc>) -> Event {
        let mut tables = self.tables.lock().await;
        let id = tables.next_id();
        let event = Event {
            id,
            name: format!("Class {}", id),
            event_type_id,
            date,
            cost,
            cancelled: false,
        };
        tables.events.insert(id, event.clone());
        event
    }

    /// Open booking; `paid` also marks the payment confirmed
    pub async fn add_booking(&self, user_id: i32, event_id: i32, paid: bool) -> Booking {
        let mut tables = self.tables.lock().await;
        let booking = Booking {
            id: tables.next_id(),
            user_id,
            event_id,
            block_id: None,
            status: BookingStatus::Open,
            paid,
            payment_confirmed: paid,
            free_class: false,
            date_booked: Utc::now(),
        };
        tables.bookings.insert(booking.id, booking.clone());
        booking
    }

    /// Paid booking for a new class on `event_date`
    pub async fn add_paid_booking(&self, user_id: i32, event_date: DateTime<Utc>) {
        let event_type = self.add_event_type(EventCategory::Class, "Pole level class").await;
        let event = self.add_event(event_type.id, Decimal::new(8, 0), event_date).await;
        self.add_booking(user_id, event.id, true).await;
    }

    /// Active two-month block type
    pub async fn add_block_type(
        &self,
        event_type_id: i32,
        size: i32,
        cost: Decimal,
        assign_free_class_on_completion: bool,
    ) -> BlockType {
        let mut tables = self.tables.lock().await;
        let block_type = BlockType {
            id: tables.next_id(),
            event_type_id,
            identifier: None,
            size,
            cost,
            duration_months: Some(2),
            duration_weeks: None,
            active: true,
            assign_free_class_on_completion,
        };
        tables.block_types.insert(block_type.id, block_type.clone());
        block_type
    }

    pub async fn add_block(
        &self,
        user_id: i32,
        block_type_id: i32,
        start_date: DateTime<Utc>,
        paid: bool,
    ) -> Block {
        let mut tables = self.tables.lock().await;
        let block_type = tables.block_types[&block_type_id].clone();
        let new = NewBlock {
            user_id,
            block_type_id,
            start_date,
            expiry_date: allocation::expiry_for(start_date, &block_type),
            paid,
            parent_id: None,
            transferred_booking_id: None,
        };
        tables
            .insert_block(&new)
            .unwrap_or_else(|| unreachable!("top-level blocks never conflict"))
    }

    pub async fn booking(&self, id: i32) -> Option<Booking> {
        self.tables.lock().await.bookings.get(&id).cloned()
    }

    pub async fn blocks_for(&self, user_id: i32) -> Vec<Block> {
        let tables = self.tables.lock().await;
        tables
            .blocks
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|u| u.username == user.username)
            || tables.email_taken(&user.email, None)
        {
            return Err(StoreError::Duplicate("username or email already registered".into()));
        }
        let created = User {
            id: tables.next_id(),
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            password_hash: user.password_hash,
            is_staff: user.is_staff,
            created_at: Utc::now(),
        };
        tables.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<User>, StoreError> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn update_names(
        &self,
        user_id: i32,
        first_name: &str,
        last_name: &str,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if let Some(user) = tables.users.get_mut(&user_id) {
            user.first_name = first_name.to_string();
            user.last_name = last_name.to_string();
        }
        Ok(())
    }

    async fn update_email(&self, user_id: i32, email: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.email_taken(email, Some(user_id)) {
            return Err(StoreError::Duplicate("email already registered".into()));
        }
        if let Some(user) = tables.users.get_mut(&user_id) {
            user.email = email.to_string();
        }
        Ok(())
    }
}

#[async_trait]
impl ActivityLogRepository for MemoryStore {
    async fn insert(&self, log: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let id = tables.activity.len() as i64 + 1;
        tables.activity.push(ActivityLogEntry {
            id,
            timestamp: Utc::now(),
            log: log.to_string(),
        });
        Ok(())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<ActivityLogEntry>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .activity
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ContentRepository for MemoryStore {
    async fn list_disclaimer_content(&self) -> Result<Vec<DisclaimerContent>, StoreError> {
        let tables = self.tables.lock().await;
        let mut rows = tables.disclaimer_content.clone();
        rows.sort_by_key(|c| c.version);
        Ok(rows)
    }

    async fn find_disclaimer_content(
        &self,
        version: Decimal,
    ) -> Result<Option<DisclaimerContent>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .disclaimer_content
            .iter()
            .find(|c| c.version == version)
            .cloned())
    }

    async fn latest_disclaimer_content(&self) -> Result<Option<DisclaimerContent>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.disclaimer_content.iter().max_by_key(|c| c.version).cloned())
    }

    async fn current_disclaimer_version(&self) -> Result<Decimal, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .disclaimer_content
            .iter()
            .filter(|c| !c.is_draft)
            .map(|c| c.version)
            .max()
            .unwrap_or(Decimal::ZERO))
    }

    async fn insert_disclaimer_content(
        &self,
        content: &DisclaimerContent,
    ) -> Result<DisclaimerContent, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.disclaimer_content.iter().any(|c| c.version == content.version) {
            return Err(StoreError::Duplicate("disclaimer content version already exists".into()));
        }
        tables.disclaimer_content.push(content.clone());
        Ok(content.clone())
    }

    async fn update_disclaimer_draft(
        &self,
        content: &DisclaimerContent,
    ) -> Result<Option<DisclaimerContent>, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(row) = tables
            .disclaimer_content
            .iter_mut()
            .find(|c| c.version == content.version && c.is_draft)
        else {
            return Ok(None);
        };
        *row = content.clone();
        Ok(Some(content.clone()))
    }

    async fn list_policies(&self, kind: PolicyKind) -> Result<Vec<PolicyDocument>, StoreError> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<PolicyDocument> = tables
            .policies
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, p)| p.clone())
            .collect();
        rows.sort_by_key(|p| p.version);
        Ok(rows)
    }

    async fn insert_policy(
        &self,
        kind: PolicyKind,
        policy: &PolicyDocument,
    ) -> Result<PolicyDocument, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables
            .policies
            .iter()
            .any(|(k, p)| *k == kind && p.version == policy.version)
        {
            return Err(StoreError::Duplicate("policy version already exists".into()));
        }
        tables.policies.push((kind, policy.clone()));
        Ok(policy.clone())
    }
}

#[async_trait]
impl DisclaimerRepository for MemoryStore {
    async fn list_for_user(&self, user_id: i32) -> Result<Vec<OnlineDisclaimer>, StoreError> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<OnlineDisclaimer> = tables
            .online
            .values()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.date, b.id).cmp(&(a.date, a.id)));
        Ok(rows)
    }

    async fn find_online(&self, id: i32) -> Result<Option<OnlineDisclaimer>, StoreError> {
        Ok(self.tables.lock().await.online.get(&id).cloned())
    }

    async fn list_online(&self) -> Result<Vec<OnlineDisclaimer>, StoreError> {
        Ok(self.tables.lock().await.online.values().cloned().collect())
    }

    async fn insert_online(&self, new: &NewOnlineDisclaimer) -> Result<OnlineDisclaimer, StoreError> {
        let mut tables = self.tables.lock().await;
        let cutoff = new.date - chrono::Duration::days(VALIDITY_DAYS);
        if tables.online.values().any(|d| {
            d.user_id == new.user_id
                && d.version == new.version
                && d.date_updated.unwrap_or(d.date) > cutoff
        }) {
            return Err(StoreError::Duplicate("Active disclaimer already exists".into()));
        }
        let created = OnlineDisclaimer {
            id: tables.next_id(),
            user_id: new.user_id,
            date: new.date,
            date_updated: new.date_updated,
            version: new.version,
            details: new.details.clone(),
        };
        tables.online.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_online(
        &self,
        disclaimer: &OnlineDisclaimer,
        current_version: Decimal,
    ) -> Result<OnlineDisclaimer, StoreError> {
        let mut tables = self.tables.lock().await;
        let cutoff = disclaimer.date_updated.unwrap_or(disclaimer.date)
            - chrono::Duration::days(VALIDITY_DAYS);
        if disclaimer.version == current_version
            && tables.online.values().any(|d| {
                d.user_id == disclaimer.user_id
                    && d.id != disclaimer.id
                    && d.version == current_version
                    && d.date_updated.unwrap_or(d.date) > cutoff
            })
        {
            return Err(StoreError::Duplicate("Active disclaimer already exists".into()));
        }
        let row = tables
            .online
            .get_mut(&disclaimer.id)
            .ok_or_else(|| StoreError::NotFound(format!("online disclaimer {}", disclaimer.id)))?;
        row.date_updated = disclaimer.date_updated;
        row.details = disclaimer.details.clone();
        Ok(row.clone())
    }

    async fn delete_online(
        &self,
        id: i32,
        archive: Option<&NewArchivedDisclaimer>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.online.remove(&id).is_none() {
            return Ok(false);
        }
        if let Some(archive) = archive {
            tables.archive(archive);
        }
        Ok(true)
    }

    async fn find_print(&self, user_id: i32) -> Result<Option<PrintDisclaimer>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.print.values().find(|p| p.user_id == user_id).cloned())
    }

    async fn list_print(&self) -> Result<Vec<PrintDisclaimer>, StoreError> {
        Ok(self.tables.lock().await.print.values().cloned().collect())
    }

    async fn insert_print(&self, user_id: i32, date: DateTime<Utc>) -> Result<PrintDisclaimer, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.print.values().any(|p| p.user_id == user_id) {
            return Err(StoreError::Duplicate("print disclaimer already recorded".into()));
        }
        let row = PrintDisclaimer {
            id: tables.next_id(),
            user_id,
            date,
        };
        tables.print.insert(row.id, row.clone());
        Ok(row)
    }

    async fn insert_non_registered(
        &self,
        new: &NewNonRegisteredDisclaimer,
    ) -> Result<NonRegisteredDisclaimer, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.non_registered.values().any(|d| d.user_uuid == new.user_uuid) {
            return Err(StoreError::Duplicate("non-registered disclaimer uuid already used".into()));
        }
        let row = NonRegisteredDisclaimer {
            id: tables.next_id(),
            first_name: new.first_name.clone(),
            last_name: new.last_name.clone(),
            email: new.email.clone(),
            event_date: new.event_date,
            user_uuid: new.user_uuid,
            date: new.date,
            version: new.version,
            details: new.details.clone(),
        };
        tables.non_registered.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_non_registered(&self, id: i32) -> Result<Option<NonRegisteredDisclaimer>, StoreError> {
        Ok(self.tables.lock().await.non_registered.get(&id).cloned())
    }

    async fn list_non_registered(&self) -> Result<Vec<NonRegisteredDisclaimer>, StoreError> {
        Ok(self.tables.lock().await.non_registered.values().cloned().collect())
    }

    async fn delete_non_registered(
        &self,
        id: i32,
        archive: Option<&NewArchivedDisclaimer>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.non_registered.remove(&id).is_none() {
            return Ok(false);
        }
        if let Some(archive) = archive {
            tables.archive(archive);
        }
        Ok(true)
    }

    async fn list_archived(&self) -> Result<Vec<ArchivedDisclaimer>, StoreError> {
        Ok(self.tables.lock().await.archived.values().cloned().collect())
    }

    async fn users_with_paid_bookings_since(&self, since: DateTime<Utc>) -> Result<Vec<i32>, StoreError> {
        let tables = self.tables.lock().await;
        let mut users: Vec<i32> = tables
            .bookings
            .values()
            .filter(|b| b.paid)
            .filter(|b| tables.events.get(&b.event_id).is_some_and(|e| e.date > since))
            .map(|b| b.user_id)
            .collect();
        users.sort_unstable();
        users.dedup();
        Ok(users)
    }

    async fn delete_swept(&self, selection: &SweepSelection) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        for id in &selection.online_ids {
            tables.online.remove(id);
        }
        for id in &selection.print_ids {
            tables.print.remove(id);
        }
        for id in &selection.non_registered_ids {
            tables.non_registered.remove(id);
        }
        for id in &selection.archived_ids {
            tables.archived.remove(id);
        }
        Ok(())
    }
}

#[async_trait]
impl BlockRepository for MemoryStore {
    async fn find_booking_context(
        &self,
        booking_id: i32,
    ) -> Result<Option<BookingContext>, StoreError> {
        let tables = self.tables.lock().await;
        let Some(booking) = tables.bookings.get(&booking_id).cloned() else {
            return Ok(None);
        };
        let event = tables
            .events
            .get(&booking.event_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("event {}", booking.event_id)))?;
        let event_type = tables
            .event_types
            .get(&event.event_type_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("event type {}", event.event_type_id)))?;
        Ok(Some(BookingContext {
            booking,
            event,
            event_type,
        }))
    }

    async fn find_block_state(&self, block_id: i32) -> Result<Option<BlockState>, StoreError> {
        let tables = self.tables.lock().await;
        tables
            .blocks
            .get(&block_id)
            .map(|block| tables.block_state(block))
            .transpose()
    }

    async fn user_block_states(&self, user_id: i32) -> Result<Vec<BlockState>, StoreError> {
        let tables = self.tables.lock().await;
        let mut blocks: Vec<&Block> = tables.blocks.values().filter(|b| b.user_id == user_id).collect();
        blocks.sort_by_key(|b| (b.start_date, b.id));
        blocks.into_iter().map(|b| tables.block_state(b)).collect()
    }

    async fn find_child_block(&self, parent_id: i32) -> Result<Option<Block>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .blocks
            .values()
            .find(|b| b.parent_id == Some(parent_id))
            .cloned())
    }

    async fn booking_ids_on_block(&self, block_id: i32) -> Result<Vec<i32>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .bookings
            .values()
            .filter(|b| b.block_id == Some(block_id))
            .map(|b| b.id)
            .collect())
    }

    async fn get_or_create_block_type(
        &self,
        event_type_id: i32,
        system_type: &SystemBlockType,
    ) -> Result<BlockType, StoreError> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables.block_types.values().find(|bt| {
            bt.event_type_id == event_type_id && bt.identifier.as_deref() == Some(system_type.identifier)
        }) {
            return Ok(existing.clone());
        }
        let block_type = BlockType {
            id: tables.next_id(),
            event_type_id,
            identifier: Some(system_type.identifier.to_string()),
            size: system_type.size,
            cost: system_type.cost,
            duration_months: system_type.duration_months,
            duration_weeks: system_type.duration_weeks,
            active: false,
            assign_free_class_on_completion: false,
        };
        tables.block_types.insert(block_type.id, block_type.clone());
        Ok(block_type)
    }

    async fn assign_block(&self, assignment: &Assignment) -> Result<AssignOutcome, StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.blocks.contains_key(&assignment.block_id) {
            return Err(StoreError::NotFound(format!("block {}", assignment.block_id)));
        }
        let used = tables.bookings_on(assignment.block_id) as i64;
        if used >= assignment.block_size as i64 {
            return Ok(AssignOutcome::BlockFull);
        }

        let booking = tables
            .bookings
            .get_mut(&assignment.booking_id)
            .ok_or_else(|| StoreError::NotFound(format!("booking {}", assignment.booking_id)))?;
        booking.block_id = Some(assignment.block_id);
        booking.paid = true;
        booking.payment_confirmed = true;
        booking.free_class = assignment.free_class;
        let booking = booking.clone();

        let mut free_class_block = None;
        if let Some(new) = &assignment.free_class_block {
            if used + 1 >= assignment.block_size as i64 {
                free_class_block = tables.insert_block(new);
            }
        }
        Ok(AssignOutcome::Assigned {
            booking,
            free_class_block,
        })
    }

    async fn apply_cancellation(&self, plan: &CancellationPlan) -> Result<Option<Block>, StoreError> {
        let mut tables = self.tables.lock().await;
        tables.bookings.insert(plan.booking.id, plan.booking.clone());

        match &plan.free_class_action {
            FreeClassAction::None => {}
            FreeClassAction::MoveToParent {
                booking_id,
                parent_id,
            } => {
                if let Some(moved) = tables.bookings.get_mut(booking_id) {
                    moved.block_id = Some(*parent_id);
                    moved.free_class = false;
                }
            }
            FreeClassAction::DeleteBlock(block_id) => {
                tables.blocks.remove(block_id);
            }
        }

        Ok(match &plan.transfer_block {
            Some(new) => tables.insert_block(new),
            None => None,
        })
    }
}

#[async_trait]
impl VoucherRepository for MemoryStore {
    async fn find_by_code(
        &self,
        kind: VoucherKind,
        code: &str,
    ) -> Result<Option<Voucher>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .vouchers
            .values()
            .find(|v| v.kind == kind && v.code == code)
            .cloned())
    }

    async fn create(&self, new: &NewVoucher) -> Result<Voucher, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables
            .vouchers
            .values()
            .any(|v| v.kind == new.kind && v.code == new.code)
        {
            return Err(StoreError::Duplicate("voucher code".into()));
        }
        let voucher = Voucher {
            id: tables.next_id(),
            kind: new.kind,
            code: new.code.clone(),
            discount: new.discount,
            start_date: new.start_date,
            expiry_date: new.expiry_date,
            max_vouchers: new.max_vouchers,
            max_per_user: new.max_per_user,
            activated: new.activated,
            applicable_type_ids: new.applicable_type_ids.clone(),
        };
        tables.vouchers.insert(voucher.id, voucher.clone());
        Ok(voucher)
    }

    async fn usage(&self, voucher_id: i32, user_id: i32) -> Result<UsageCounts, StoreError> {
        Ok(self.tables.lock().await.usage(voucher_id, user_id))
    }

    async fn unpaid_items(
        &self,
        kind: VoucherKind,
        user_id: i32,
        now: DateTime<Utc>,
    ) -> Result<Vec<UnpaidItem>, StoreError> {
        let tables = self.tables.lock().await;
        let mut items: Vec<(DateTime<Utc>, UnpaidItem)> = Vec::new();
        match kind {
            VoucherKind::Event => {
                for booking in tables.bookings.values() {
                    if booking.user_id != user_id
                        || booking.paid
                        || booking.status != BookingStatus::Open
                    {
                        continue;
                    }
                    let Some(event) = tables.events.get(&booking.event_id) else {
                        continue;
                    };
                    if event.cancelled || event.date < now || event.cost <= Decimal::ZERO {
                        continue;
                    }
                    let type_name = tables
                        .event_types
                        .get(&event.event_type_id)
                        .map(|t| t.subtype.clone())
                        .unwrap_or_default();
                    items.push((
                        event.date,
                        UnpaidItem {
                            id: booking.id,
                            type_id: event.event_type_id,
                            type_name,
                            cost: event.cost,
                        },
                    ));
                }
            }
            VoucherKind::Block => {
                for block in tables.blocks.values() {
                    if block.user_id != user_id || block.paid || block.expiry_date < now {
                        continue;
                    }
                    let Some(block_type) = tables.block_types.get(&block.block_type_id) else {
                        continue;
                    };
                    let subtype = tables
                        .event_types
                        .get(&block_type.event_type_id)
                        .map(|t| t.subtype.as_str())
                        .unwrap_or_default();
                    let identifier = block_type
                        .identifier
                        .as_ref()
                        .map(|i| format!(" ({})", i))
                        .unwrap_or_default();
                    items.push((
                        block.start_date,
                        UnpaidItem {
                            id: block.id,
                            type_id: block_type.id,
                            type_name: format!("{}{} - quantity {}", subtype, identifier, block_type.size),
                            cost: block_type.cost,
                        },
                    ));
                }
            }
        }
        items.sort_by_key(|(date, item)| (*date, item.id));
        Ok(items.into_iter().map(|(_, item)| item).collect())
    }

    async fn find_redemption(
        &self,
        voucher_id: i32,
        item_id: i32,
    ) -> Result<Option<UsedVoucher>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .used_vouchers
            .iter()
            .find(|u| u.voucher_id == voucher_id && u.item_id == item_id)
            .cloned())
    }

    async fn record_redemption(
        &self,
        voucher: &Voucher,
        redemption: &Redemption,
    ) -> Result<RedemptionOutcome, StoreError> {
        let mut tables = self.tables.lock().await;
        let item_id = redemption.item.id();

        if let Some(existing) = tables
            .used_vouchers
            .iter()
            .find(|u| u.voucher_id == voucher.id && u.item_id == item_id)
        {
            return Ok(RedemptionOutcome::AlreadyRecorded(existing.clone()));
        }
        if !rules::has_allowance(voucher, tables.usage(voucher.id, redemption.user_id)) {
            return Ok(RedemptionOutcome::CapReached);
        }

        let used = UsedVoucher {
            id: tables.next_id(),
            voucher_id: voucher.id,
            user_id: redemption.user_id,
            item_id,
            used_at: redemption.used_at,
        };
        tables.used_vouchers.push(used.clone());

        match &redemption.item {
            PaidItem::Booking(id) => {
                if let Some(booking) = tables
                    .bookings
                    .get_mut(id)
                    .filter(|b| b.user_id == redemption.user_id)
                {
                    booking.paid = true;
                    booking.payment_confirmed = true;
                }
            }
            PaidItem::Block {
                id,
                start_date,
                expiry_date,
            } => {
                if let Some(block) = tables
                    .blocks
                    .get_mut(id)
                    .filter(|b| b.user_id == redemption.user_id)
                {
                    block.paid = true;
                    block.start_date = *start_date;
                    block.expiry_date = *expiry_date;
                }
            }
        }
        Ok(RedemptionOutcome::Recorded(used))
    }
}

#[async_trait]
impl GroupRepository for MemoryStore {
    async fn ensure_group(&self, name: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.groups.contains_key(name) {
            return Ok(false);
        }
        tables.groups.insert(name.to_string(), Vec::new());
        Ok(true)
    }

    async fn delete_group(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.tables.lock().await.groups.remove(name).is_some())
    }

    async fn members(&self, name: &str) -> Result<Vec<User>, StoreError> {
        let tables = self.tables.lock().await;
        let mut users: Vec<User> = tables
            .groups
            .get(name)
            .map(|ids| ids.iter().filter_map(|id| tables.users.get(id).cloned()).collect())
            .unwrap_or_default();
        users.sort_by(|a, b| (&a.first_name, &a.last_name).cmp(&(&b.first_name, &b.last_name)));
        Ok(users)
    }

    async fn is_member(&self, name: &str, user_id: i32) -> Result<bool, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.groups.get(name).is_some_and(|ids| ids.contains(&user_id)))
    }

    async fn add_member(&self, name: &str, user_id: i32) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if let Some(ids) = tables.groups.get_mut(name) {
            if !ids.contains(&user_id) {
                ids.push(user_id);
            }
        }
        Ok(())
    }

    async fn remove_member(&self, name: &str, user_id: i32) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if let Some(ids) = tables.groups.get_mut(name) {
            ids.retain(|id| *id != user_id);
        }
        Ok(())
    }

    async fn add_members_by_email(&self, name: &str, emails: &[String]) -> Result<usize, StoreError> {
        let mut tables = self.tables.lock().await;
        let matched: Vec<i32> = tables
            .users
            .values()
            .filter(|u| emails.iter().any(|e| e.eq_ignore_ascii_case(&u.email)))
            .map(|u| u.id)
            .collect();
        if let Some(ids) = tables.groups.get_mut(name) {
            for id in &matched {
                if !ids.contains(id) {
                    ids.push(*id);
                }
            }
        }
        Ok(matched.len())
    }
}
