//! Time-ordered trajectories.
//!
//! A [`Trajectory`] is the planned motion of one vehicle on one map: a
//! sequence of segments, each recording the kinematic state reached at its
//! finish time. Finish times are unique and traversal always follows time
//! order, including immediately after a segment is re-timed.
//!
//! Segments live in an arena and are addressed by [`SegmentId`] handles, with
//! a separate index ordered by finish time. Re-timing a segment only moves
//! its entry in the index, so handles stay valid however the order changes.
//! Erased slots are reused by later inserts; each slot carries a generation
//! so a handle to an erased segment never names its replacement.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;
use std::ops::Bound;

use chrono::Duration;
use nalgebra::Vector3;

use super::{Motion, ProfileHandle, Time, TimedState, TrajectoryError};

/// Stable handle to a segment of a [`Trajectory`].
///
/// A handle keeps naming the same segment when its finish time changes.
/// Handles taken from a trajectory also name the corresponding segments of
/// any clone of it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId {
    index: usize,
    generation: u32,
}

impl SegmentId {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            generation: 0,
        }
    }
}

impl fmt::Debug for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SegmentId({}v{})", self.index, self.generation)
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    data: Option<SegmentData>,
}

#[derive(Debug, Clone)]
struct SegmentData {
    finish_time: Time,
    position: Vector3<f64>,
    velocity: Vector3<f64>,
    profile: ProfileHandle,
}

/// Outcome of [`Trajectory::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertResult {
    /// The new segment, or the existing segment at the requested time when
    /// nothing was inserted.
    pub id: SegmentId,

    /// Whether a new segment was created.
    pub inserted: bool,
}

/// Planned motion of a single vehicle on a single map.
///
/// Cloning deep-copies the segments, but the copies keep referring to the
/// same profiles as the source.
#[derive(Debug, Clone)]
pub struct Trajectory {
    map_name: String,
    slots: Vec<Slot>,
    /// Indices of erased slots, ready for reuse.
    free: Vec<usize>,
    order: BTreeMap<Time, SegmentId>,
}

impl Trajectory {
    /// Creates an empty trajectory on the given map.
    pub fn new(map_name: impl Into<String>) -> Self {
        Self {
            map_name: map_name.into(),
            slots: Vec::new(),
            free: Vec::new(),
            order: BTreeMap::new(),
        }
    }

    /// Name of the map this trajectory is on.
    pub fn map_name(&self) -> &str {
        &self.map_name
    }

    /// Moves the trajectory to another map.
    pub fn set_map_name(&mut self, map_name: impl Into<String>) {
        self.map_name = map_name.into();
    }

    /// Adds a segment that finishes at `time`.
    ///
    /// Nothing changes if a segment already finishes at `time`; the result
    /// then has `inserted == false` and names the existing segment.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{Duration, TimeZone, Utc};
    /// use nalgebra::Vector3;
    /// use traffic_planner::domain::{ProfileHandle, Shape, Trajectory};
    ///
    /// let t0 = Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap();
    /// let profile = ProfileHandle::strict(Shape::circle(1.0));
    /// let mut trajectory = Trajectory::new("L1");
    ///
    /// let later = trajectory.insert(t0 + Duration::seconds(10), profile.clone(), Vector3::zeros(), Vector3::zeros());
    /// let first = trajectory.insert(t0, profile.clone(), Vector3::zeros(), Vector3::zeros());
    /// assert!(later.inserted && first.inserted);
    /// assert_eq!(trajectory.first().map(|s| s.id()), Some(first.id));
    ///
    /// let duplicate = trajectory.insert(t0, profile, Vector3::new(1.0, 1.0, 0.0), Vector3::zeros());
    /// assert!(!duplicate.inserted);
    /// assert_eq!(duplicate.id, first.id);
    /// assert_eq!(trajectory.len(), 2);
    /// ```
    pub fn insert(
        &mut self,
        time: Time,
        profile: ProfileHandle,
        position: Vector3<f64>,
        velocity: Vector3<f64>,
    ) -> InsertResult {
        if let Some(&existing) = self.order.get(&time) {
            return InsertResult {
                id: existing,
                inserted: false,
            };
        }

        let data = SegmentData {
            finish_time: time,
            position,
            velocity,
            profile,
        };
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.data = Some(data);
                SegmentId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    data: Some(data),
                });
                SegmentId::new(self.slots.len() - 1)
            }
        };
        self.order.insert(time, id);

        InsertResult { id, inserted: true }
    }

    /// Removes a segment and returns the one that follows it in time order
    /// (`None` if it was the last).
    pub fn erase(&mut self, id: SegmentId) -> Result<Option<SegmentId>, TrajectoryError> {
        let data = self.release(id)?;
        self.order.remove(&data.finish_time);

        Ok(self.first_at_or_after(data.finish_time))
    }

    /// Removes every segment from `first` up to, but not including, `last`
    /// (`None` = through the end). Returns `last`.
    ///
    /// Nothing is removed if `last` comes before `first`.
    pub fn erase_range(
        &mut self,
        first: SegmentId,
        last: Option<SegmentId>,
    ) -> Result<Option<SegmentId>, TrajectoryError> {
        let from = self.data(first)?.finish_time;
        let upper = match last {
            Some(id) => Bound::Excluded(self.data(id)?.finish_time),
            None => Bound::Unbounded,
        };
        if let Bound::Excluded(until) = upper {
            if until < from {
                return Ok(last);
            }
        }

        let doomed: Vec<(Time, SegmentId)> = self
            .order
            .range((Bound::Included(from), upper))
            .map(|(t, id)| (*t, *id))
            .collect();
        for (time, id) in doomed {
            self.order.remove(&time);
            self.release(id)?;
        }

        Ok(last)
    }

    /// First segment finishing at or after `time`, if any.
    pub fn find(&self, time: Time) -> Option<SegmentId> {
        self.first_at_or_after(time)
    }

    /// Read access to a segment.
    pub fn get(&self, id: SegmentId) -> Option<Segment<'_>> {
        let data = self.data(id).ok()?;
        Some(Segment { id, data })
    }

    /// Write access to a segment.
    pub fn get_mut(&mut self, id: SegmentId) -> Option<SegmentMut<'_>> {
        self.data(id).ok()?;
        Some(SegmentMut {
            trajectory: self,
            id,
        })
    }

    /// Segment that follows `id` in time order.
    pub fn next(&self, id: SegmentId) -> Option<SegmentId> {
        let time = self.get(id)?.finish_time();
        self.order
            .range((Bound::Excluded(time), Bound::Unbounded))
            .next()
            .map(|(_, id)| *id)
    }

    /// Segment that precedes `id` in time order.
    pub fn prev(&self, id: SegmentId) -> Option<SegmentId> {
        let time = self.get(id)?.finish_time();
        self.order.range(..time).next_back().map(|(_, id)| *id)
    }

    /// Earliest segment.
    pub fn first(&self) -> Option<Segment<'_>> {
        self.iter().next()
    }

    /// Latest segment.
    pub fn last(&self) -> Option<Segment<'_>> {
        self.iter().next_back()
    }

    /// Segments in time order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            slots: &self.slots,
            inner: self.order.values(),
        }
    }

    /// Interpolating motions between consecutive segments, in time order.
    pub fn motions(&self) -> impl Iterator<Item = Motion> + '_ {
        self.iter()
            .zip(self.iter().skip(1))
            .map(|(a, b)| Motion::between(&a.state(), &b.state()))
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the trajectory has no segments.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Finish time of the earliest segment.
    pub fn start_time(&self) -> Option<Time> {
        self.order.keys().next().copied()
    }

    /// Finish time of the latest segment.
    pub fn finish_time(&self) -> Option<Time> {
        self.order.keys().next_back().copied()
    }

    /// Time from the first segment to the last; zero for fewer than two.
    pub fn duration(&self) -> Duration {
        match (self.start_time(), self.finish_time()) {
            (Some(start), Some(finish)) => finish.signed_duration_since(start),
            _ => Duration::zero(),
        }
    }

    /// Interpolated `(x, y, heading)` at `time`, or `None` outside the
    /// trajectory's time range.
    pub fn position_at(&self, time: Time) -> Option<Vector3<f64>> {
        self.motion_at(time).map(|m| m.compute_position(time))
    }

    /// Interpolated `(vx, vy, ω)` at `time`, or `None` outside the
    /// trajectory's time range.
    pub fn velocity_at(&self, time: Time) -> Option<Vector3<f64>> {
        self.motion_at(time).map(|m| m.compute_velocity(time))
    }

    fn motion_at(&self, time: Time) -> Option<Motion> {
        let finish = self.get(self.find(time)?)?;
        let start = match self.prev(finish.id()) {
            Some(prev) => self.get(prev)?,
            // Only the first segment's own instant lies inside the range
            None if finish.finish_time() == time => finish,
            None => return None,
        };
        Some(Motion::between(&start.state(), &finish.state()))
    }

    fn first_at_or_after(&self, time: Time) -> Option<SegmentId> {
        self.order.range(time..).next().map(|(_, id)| *id)
    }

    fn data(&self, id: SegmentId) -> Result<&SegmentData, TrajectoryError> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.data.as_ref())
            .ok_or(TrajectoryError::UnknownSegment(id))
    }

    fn data_mut(&mut self, id: SegmentId) -> Result<&mut SegmentData, TrajectoryError> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.data.as_mut())
            .ok_or(TrajectoryError::UnknownSegment(id))
    }

    /// Empties the slot behind `id` and queues it for reuse. The order index
    /// is left to the caller.
    fn release(&mut self, id: SegmentId) -> Result<SegmentData, TrajectoryError> {
        let slot = self
            .slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .ok_or(TrajectoryError::UnknownSegment(id))?;
        let data = slot.data.take().ok_or(TrajectoryError::UnknownSegment(id))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Ok(data)
    }

    fn set_finish_time(&mut self, id: SegmentId, time: Time) -> Result<(), TrajectoryError> {
        let current = self.data(id)?.finish_time;
        if current == time {
            return Ok(());
        }
        if self.order.contains_key(&time) {
            return Err(TrajectoryError::TimeConflict { time });
        }

        self.order.remove(&current);
        self.order.insert(time, id);
        self.data_mut(id)?.finish_time = time;
        Ok(())
    }

    fn adjust_finish_times(&mut self, id: SegmentId, delta: Duration) -> Result<(), TrajectoryError> {
        let anchor = self.data(id)?.finish_time;
        if delta.is_zero() {
            return Ok(());
        }

        let tail: Vec<(Time, SegmentId)> = self
            .order
            .range(anchor..)
            .map(|(t, id)| (*t, *id))
            .collect();

        // Validate every shifted time before touching anything
        let mut shifted = Vec::with_capacity(tail.len());
        for &(time, seg) in &tail {
            let new_time = time
                .checked_add_signed(delta)
                .ok_or(TrajectoryError::TimeOutOfRange)?;
            if new_time < anchor && self.order.contains_key(&new_time) {
                return Err(TrajectoryError::TimeConflict { time: new_time });
            }
            shifted.push((new_time, seg));
        }

        for (time, _) in &tail {
            self.order.remove(time);
        }
        for (new_time, seg) in shifted {
            self.order.insert(new_time, seg);
            self.data_mut(seg)?.finish_time = new_time;
        }
        Ok(())
    }
}

/// Iterator over the segments of a trajectory in time order.
pub struct Iter<'a> {
    slots: &'a [Slot],
    inner: btree_map::Values<'a, Time, SegmentId>,
}

impl<'a> Iter<'a> {
    fn view(&self, id: SegmentId) -> Option<Segment<'a>> {
        let data = self.slots.get(id.index)?.data.as_ref()?;
        Some(Segment { id, data })
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = *self.inner.next()?;
        self.view(id)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl DoubleEndedIterator for Iter<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let id = *self.inner.next_back()?;
        self.view(id)
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a Trajectory {
    type Item = Segment<'a>;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Read-only view of a segment.
#[derive(Debug, Clone, Copy)]
pub struct Segment<'a> {
    id: SegmentId,
    data: &'a SegmentData,
}

impl<'a> Segment<'a> {
    /// Handle of this segment.
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// When the vehicle reaches this segment's state.
    pub fn finish_time(&self) -> Time {
        self.data.finish_time
    }

    /// `(x, y, heading)` at the finish time.
    pub fn finish_position(&self) -> Vector3<f64> {
        self.data.position
    }

    /// `(vx, vy, ω)` at the finish time.
    pub fn finish_velocity(&self) -> Vector3<f64> {
        self.data.velocity
    }

    /// The shared profile this segment refers to.
    pub fn profile(&self) -> &'a ProfileHandle {
        &self.data.profile
    }

    /// The finish state as a [`TimedState`].
    pub fn state(&self) -> TimedState {
        TimedState::new(self.data.finish_time, self.data.position, self.data.velocity)
    }
}

/// Mutable access to a segment.
///
/// Holding a `SegmentMut` borrows the whole trajectory, because re-timing a
/// segment may reorder its neighbours.
pub struct SegmentMut<'a> {
    trajectory: &'a mut Trajectory,
    id: SegmentId,
}

impl SegmentMut<'_> {
    /// Handle of this segment.
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Read-only view of the segment's current values.
    pub fn get(&self) -> Segment<'_> {
        Segment {
            id: self.id,
            data: self.data(),
        }
    }

    /// Points the segment at a different profile.
    pub fn set_profile(&mut self, profile: ProfileHandle) {
        self.data_mut().profile = profile;
    }

    /// Replaces the finish position.
    pub fn set_finish_position(&mut self, position: Vector3<f64>) {
        self.data_mut().position = position;
    }

    /// Replaces the finish velocity.
    pub fn set_finish_velocity(&mut self, velocity: Vector3<f64>) {
        self.data_mut().velocity = velocity;
    }

    /// Moves the segment to a new finish time, relocating it in the time
    /// order as needed.
    ///
    /// Fails without changing anything if another segment already finishes
    /// at `time`.
    pub fn set_finish_time(&mut self, time: Time) -> Result<(), TrajectoryError> {
        self.trajectory.set_finish_time(self.id, time)
    }

    /// Shifts this segment and every later one by `delta`.
    ///
    /// Segments that finish before this one are never touched, even when a
    /// large negative `delta` moves the shifted segments past them. The only
    /// rejection is an exact finish-time collision with one of those earlier
    /// segments, in which case nothing changes.
    pub fn adjust_finish_times(&mut self, delta: Duration) -> Result<(), TrajectoryError> {
        self.trajectory.adjust_finish_times(self.id, delta)
    }

    fn data(&self) -> &SegmentData {
        match self.trajectory.slots.get(self.id.index) {
            Some(Slot {
                data: Some(data), ..
            }) => data,
            // SegmentMut is only handed out for live slots and holds the
            // only borrow, so the slot cannot be emptied underneath it
            _ => unreachable!("SegmentMut refers to an erased segment"),
        }
    }

    fn data_mut(&mut self) -> &mut SegmentData {
        match self.trajectory.slots.get_mut(self.id.index) {
            Some(Slot {
                data: Some(data), ..
            }) => data,
            _ => unreachable!("SegmentMut refers to an erased segment"),
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::domain::Shape;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn t0() -> Time {
        Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap()
    }

    #[derive(Debug, Clone)]
    enum Op {
        Insert(i64),
        Erase(usize),
        SetTime(usize, i64),
        Adjust(usize, i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (-100i64..100).prop_map(Op::Insert),
            (0usize..16).prop_map(Op::Erase),
            ((0usize..16), (-100i64..100)).prop_map(|(i, t)| Op::SetTime(i, t)),
            ((0usize..16), (-60i64..60)).prop_map(|(i, d)| Op::Adjust(i, d)),
        ]
    }

    /// Finish times are unique and traversal follows time order.
    fn assert_time_invariant(trajectory: &Trajectory) -> Result<(), TestCaseError> {
        let times: Vec<Time> = trajectory.iter().map(|s| s.finish_time()).collect();
        prop_assert_eq!(times.len(), trajectory.len());
        for pair in times.windows(2) {
            prop_assert!(pair[0] < pair[1], "out of order: {:?}", pair);
        }
        for segment in trajectory.iter() {
            prop_assert_eq!(trajectory.find(segment.finish_time()), Some(segment.id()));
        }
        Ok(())
    }

    fn nth_id(trajectory: &Trajectory, n: usize) -> Option<SegmentId> {
        let len = trajectory.len();
        if len == 0 {
            return None;
        }
        trajectory.iter().nth(n % len).map(|s| s.id())
    }

    proptest! {
        /// Property: the time invariant holds after every mutation.
        #[test]
        fn time_invariant_survives_mutations(ops in prop::collection::vec(op(), 1..40)) {
            let profile = ProfileHandle::strict(Shape::circle(1.0));
            let mut trajectory = Trajectory::new("test_map");

            for op in ops {
                match op {
                    Op::Insert(s) => {
                        let time = t0() + Duration::seconds(s);
                        let existed = trajectory.find(time)
                            .and_then(|id| trajectory.get(id))
                            .is_some_and(|seg| seg.finish_time() == time);
                        let len = trajectory.len();
                        let result = trajectory.insert(time, profile.clone(), Vector3::zeros(), Vector3::zeros());
                        prop_assert_eq!(result.inserted, !existed);
                        prop_assert_eq!(trajectory.len(), if existed { len } else { len + 1 });
                    }
                    Op::Erase(n) => {
                        if let Some(id) = nth_id(&trajectory, n) {
                            trajectory.erase(id).unwrap();
                        }
                    }
                    Op::SetTime(n, s) => {
                        if let Some(id) = nth_id(&trajectory, n) {
                            let before: Vec<Time> = trajectory.iter().map(|s| s.finish_time()).collect();
                            let time = t0() + Duration::seconds(s);
                            if trajectory.get_mut(id).unwrap().set_finish_time(time).is_err() {
                                let after: Vec<Time> = trajectory.iter().map(|s| s.finish_time()).collect();
                                prop_assert_eq!(before, after);
                            } else {
                                prop_assert_eq!(trajectory.get(id).unwrap().finish_time(), time);
                            }
                        }
                    }
                    Op::Adjust(n, d) => {
                        if let Some(id) = nth_id(&trajectory, n) {
                            let _ = trajectory.get_mut(id).unwrap().adjust_finish_times(Duration::seconds(d));
                        }
                    }
                }
                assert_time_invariant(&trajectory)?;
            }
        }

        /// Property: adjust_finish_times shifts the anchor and everything
        /// after it by exactly delta and leaves earlier segments untouched.
        #[test]
        fn tail_shift_is_exact(
            count in 2usize..10,
            anchor in 0usize..10,
            delta in -1000i64..1000,
        ) {
            let anchor = anchor % count;
            let profile = ProfileHandle::strict(Shape::circle(1.0));
            let mut trajectory = Trajectory::new("test_map");
            let ids: Vec<SegmentId> = (0..count)
                .map(|i| {
                    let time = t0() + Duration::seconds(10 * i as i64);
                    trajectory.insert(time, profile.clone(), Vector3::zeros(), Vector3::zeros()).id
                })
                .collect();
            let before: Vec<Time> = ids.iter().map(|id| trajectory.get(*id).unwrap().finish_time()).collect();

            let result = trajectory.get_mut(ids[anchor]).unwrap().adjust_finish_times(Duration::seconds(delta));

            if result.is_ok() {
                for (i, id) in ids.iter().enumerate() {
                    let expected = if i >= anchor { before[i] + Duration::seconds(delta) } else { before[i] };
                    prop_assert_eq!(trajectory.get(*id).unwrap().finish_time(), expected);
                }
            } else {
                // Rejected only on an exact collision with the untouched head
                let collides = (anchor..count).any(|i| {
                    let shifted = before[i] + Duration::seconds(delta);
                    before[..anchor].contains(&shifted)
                });
                prop_assert!(collides);
                for (i, id) in ids.iter().enumerate() {
                    prop_assert_eq!(trajectory.get(*id).unwrap().finish_time(), before[i]);
                }
            }
            assert_time_invariant(&trajectory)?;
        }
    }
}
