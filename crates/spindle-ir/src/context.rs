//! IrContext: arena storage for the whole unit being lowered.
//!
//! Operations, values, blocks and regions live in `PrimaryMap`s owned by
//! `IrContext`. Operand and result lists use `EntityList + ListPool`.
//! Every operand slot is mirrored in a use-chain so that replacing a value
//! rewrites the referencing slots instead of chasing pointers.

use std::collections::BTreeMap;

use cranelift_entity::{EntityList, ListPool, PrimaryMap, SecondaryMap};
use smallvec::SmallVec;

use crate::location::Location;
use crate::refs::*;
use crate::symbol::Symbol;
use crate::types::*;

// ============================================================================
// Use-chain
// ============================================================================

/// A single use of a value: the using operation and the operand index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Use {
    pub user: OpRef,
    pub operand_index: u32,
}

// ============================================================================
// Entity data types
// ============================================================================

/// Data for a single operation.
pub struct OperationData {
    pub location: Location,
    pub dialect: Symbol,
    pub name: Symbol,
    pub operands: EntityList<ValueRef>,
    pub results: EntityList<TypeRef>,
    pub attributes: BTreeMap<Symbol, Attribute>,
    pub regions: SmallVec<[RegionRef; 4]>,
    pub successors: SmallVec<[BlockRef; 4]>,
    pub parent_block: Option<BlockRef>,
}

/// Data for a single SSA value.
pub struct ValueData {
    pub def: ValueDef,
    pub ty: TypeRef,
}

/// Data for a block argument.
#[derive(Clone, Debug)]
pub struct BlockArgData {
    pub ty: TypeRef,
    pub attrs: BTreeMap<Symbol, Attribute>,
}

impl BlockArgData {
    pub fn of_type(ty: TypeRef) -> Self {
        Self {
            ty,
            attrs: BTreeMap::new(),
        }
    }
}

/// Data for a basic block.
pub struct BlockData {
    pub location: Location,
    pub args: Vec<BlockArgData>,
    pub ops: SmallVec<[OpRef; 4]>,
    pub parent_region: Option<RegionRef>,
}

impl BlockData {
    /// An empty, unattached block with the given argument types.
    pub fn new(location: Location, arg_types: impl IntoIterator<Item = TypeRef>) -> Self {
        Self {
            location,
            args: arg_types.into_iter().map(BlockArgData::of_type).collect(),
            ops: SmallVec::new(),
            parent_region: None,
        }
    }
}

/// Data for a region (ordered list of blocks).
pub struct RegionData {
    pub location: Location,
    pub blocks: SmallVec<[BlockRef; 4]>,
    pub parent_op: Option<OpRef>,
}

// ============================================================================
// IrContext
// ============================================================================

/// Arena-based mutable IR context.
///
/// Owns all IR entities and keeps use-chains in sync with operand lists.
pub struct IrContext {
    ops: PrimaryMap<OpRef, OperationData>,
    values: PrimaryMap<ValueRef, ValueData>,
    blocks: PrimaryMap<BlockRef, BlockData>,
    regions: PrimaryMap<RegionRef, RegionData>,

    /// For each value, the operand slots that reference it.
    uses: SecondaryMap<ValueRef, SmallVec<[Use; 2]>>,

    pub types: TypeInterner,
    pub paths: PathInterner,

    value_pool: ListPool<ValueRef>,
    type_pool: ListPool<TypeRef>,

    result_values: SecondaryMap<OpRef, EntityList<ValueRef>>,
    block_arg_values: SecondaryMap<BlockRef, EntityList<ValueRef>>,
}

impl IrContext {
    pub fn new() -> Self {
        Self {
            ops: PrimaryMap::new(),
            values: PrimaryMap::new(),
            blocks: PrimaryMap::new(),
            regions: PrimaryMap::new(),
            uses: SecondaryMap::new(),
            types: TypeInterner::new(),
            paths: PathInterner::new(),
            value_pool: ListPool::new(),
            type_pool: ListPool::new(),
            result_values: SecondaryMap::new(),
            block_arg_values: SecondaryMap::new(),
        }
    }

    // ========================================================================
    // Operation
    // ========================================================================

    /// Create a new operation and allocate its result values.
    ///
    /// Operands are registered in the use-chain. The operation starts out
    /// unattached; use `push_op` or `insert_op_before` to place it.
    ///
    /// # Panics
    ///
    /// Panics if `data.parent_block` is set, or if a region in
    /// `data.regions` already belongs to another operation.
    pub fn create_op(&mut self, data: OperationData) -> OpRef {
        assert!(
            data.parent_block.is_none(),
            "create_op: operation must not have parent_block set; \
             use push_op to attach to a block after creation",
        );

        let operand_slice: SmallVec<[ValueRef; 8]> =
            data.operands.as_slice(&self.value_pool).into();
        let result_types: SmallVec<[TypeRef; 4]> = data.results.as_slice(&self.type_pool).into();
        let regions: SmallVec<[RegionRef; 4]> = data.regions.clone();

        let op = self.ops.push(data);

        for &r in &regions {
            if let Some(existing) = self.regions[r].parent_op {
                panic!(
                    "create_op: region {r} already belongs to operation {existing}; \
                     cannot reassign to {op}",
                );
            }
            self.regions[r].parent_op = Some(op);
        }

        for (idx, &val) in operand_slice.iter().enumerate() {
            self.uses[val].push(Use {
                user: op,
                operand_index: idx as u32,
            });
        }

        let mut result_value_list = EntityList::new();
        for (idx, &ty) in result_types.iter().enumerate() {
            let v = self.values.push(ValueData {
                def: ValueDef::OpResult(op, idx as u32),
                ty,
            });
            result_value_list.push(v, &mut self.value_pool);
        }
        self.result_values[op] = result_value_list;

        op
    }

    pub fn op(&self, op: OpRef) -> &OperationData {
        &self.ops[op]
    }

    /// Mutable access to operation data.
    ///
    /// Editing `operands` through this reference desyncs the use-chain;
    /// use `set_operand`/`set_operands` instead.
    pub fn op_mut(&mut self, op: OpRef) -> &mut OperationData {
        &mut self.ops[op]
    }

    pub fn op_operands(&self, op: OpRef) -> &[ValueRef] {
        self.ops[op].operands.as_slice(&self.value_pool)
    }

    pub fn op_result_types(&self, op: OpRef) -> &[TypeRef] {
        self.ops[op].results.as_slice(&self.type_pool)
    }

    pub fn op_result(&self, op: OpRef, index: u32) -> ValueRef {
        self.result_values[op].as_slice(&self.value_pool)[index as usize]
    }

    pub fn op_results(&self, op: OpRef) -> &[ValueRef] {
        self.result_values[op].as_slice(&self.value_pool)
    }

    /// Look up an attribute by static key.
    pub fn op_attr(&self, op: OpRef, key: &'static str) -> Option<&Attribute> {
        self.ops[op].attributes.get(&Symbol::new(key))
    }

    /// The operation that owns the region containing `op`, if any.
    pub fn parent_op(&self, op: OpRef) -> Option<OpRef> {
        let block = self.ops[op].parent_block?;
        self.block_parent_op(block)
    }

    /// Overwrite one operand, keeping the use-chain in sync.
    pub fn set_operand(&mut self, op: OpRef, index: u32, new: ValueRef) {
        let slice = self.ops[op].operands.as_mut_slice(&mut self.value_pool);
        let old = std::mem::replace(&mut slice[index as usize], new);
        if old == new {
            return;
        }
        self.uses[old].retain(|u| !(u.user == op && u.operand_index == index));
        self.uses[new].push(Use {
            user: op,
            operand_index: index,
        });
    }

    /// Replace the whole operand list, keeping the use-chain in sync.
    pub fn set_operands(&mut self, op: OpRef, values: &[ValueRef]) {
        let old: SmallVec<[ValueRef; 8]> = self.op_operands(op).into();
        for (idx, &val) in old.iter().enumerate() {
            self.uses[val].retain(|u| !(u.user == op && u.operand_index == idx as u32));
        }
        let mut list = EntityList::new();
        for (idx, &val) in values.iter().enumerate() {
            list.push(val, &mut self.value_pool);
            self.uses[val].push(Use {
                user: op,
                operand_index: idx as u32,
            });
        }
        self.ops[op].operands = list;
    }

    /// Detach an operation from its parent block, if it has one.
    pub fn detach_op(&mut self, op: OpRef) {
        if let Some(block) = self.ops[op].parent_block {
            self.remove_op_from_block(block, op);
        }
    }

    /// Remove an operation, clearing its operand use-chain entries.
    ///
    /// # Panics
    ///
    /// Panics if the operation is still attached to a block, or if any of
    /// its results still has uses.
    pub fn remove_op(&mut self, op: OpRef) {
        if let Some(block) = self.ops[op].parent_block {
            panic!(
                "remove_op: operation {op} is still attached to block {block}; \
                 call remove_op_from_block first",
            );
        }

        let results: SmallVec<[ValueRef; 4]> =
            self.result_values[op].as_slice(&self.value_pool).into();
        for &val in &results {
            assert!(
                self.uses[val].is_empty(),
                "remove_op: result value {val} still has {} use(s); \
                 replace all uses before removing the operation",
                self.uses[val].len()
            );
        }

        let operands: SmallVec<[ValueRef; 8]> =
            self.ops[op].operands.as_slice(&self.value_pool).into();
        for (idx, &val) in operands.iter().enumerate() {
            self.uses[val].retain(|u| !(u.user == op && u.operand_index == idx as u32));
        }
    }

    // ========================================================================
    // Value
    // ========================================================================

    pub fn value(&self, v: ValueRef) -> &ValueData {
        &self.values[v]
    }

    pub fn value_ty(&self, v: ValueRef) -> TypeRef {
        self.values[v].ty
    }

    pub fn value_def(&self, v: ValueRef) -> ValueDef {
        self.values[v].def
    }

    /// The block a value is defined in, if its definition is attached.
    pub fn value_block(&self, v: ValueRef) -> Option<BlockRef> {
        match self.values[v].def {
            ValueDef::OpResult(op, _) => self.ops[op].parent_block,
            ValueDef::BlockArg(block, _) => Some(block),
        }
    }

    // ========================================================================
    // Block
    // ========================================================================

    /// Create a new block and allocate its argument values.
    pub fn create_block(&mut self, data: BlockData) -> BlockRef {
        let arg_types: Vec<TypeRef> = data.args.iter().map(|a| a.ty).collect();
        let block = self.blocks.push(data);

        let mut arg_value_list = EntityList::new();
        for (idx, ty) in arg_types.into_iter().enumerate() {
            let v = self.values.push(ValueData {
                def: ValueDef::BlockArg(block, idx as u32),
                ty,
            });
            arg_value_list.push(v, &mut self.value_pool);
        }
        self.block_arg_values[block] = arg_value_list;

        block
    }

    pub fn block(&self, b: BlockRef) -> &BlockData {
        &self.blocks[b]
    }

    pub fn block_mut(&mut self, b: BlockRef) -> &mut BlockData {
        &mut self.blocks[b]
    }

    pub fn block_arg(&self, b: BlockRef, index: u32) -> ValueRef {
        self.block_arg_values[b].as_slice(&self.value_pool)[index as usize]
    }

    pub fn block_args(&self, b: BlockRef) -> &[ValueRef] {
        self.block_arg_values[b].as_slice(&self.value_pool)
    }

    /// Append a new argument to a block and return its value.
    pub fn add_block_arg(&mut self, b: BlockRef, ty: TypeRef) -> ValueRef {
        let idx = self.blocks[b].args.len() as u32;
        self.blocks[b].args.push(BlockArgData::of_type(ty));
        let v = self.values.push(ValueData {
            def: ValueDef::BlockArg(b, idx),
            ty,
        });
        self.block_arg_values[b].push(v, &mut self.value_pool);
        v
    }

    /// Retype a block argument in place. Uses are unaffected.
    pub fn set_block_arg_type(&mut self, b: BlockRef, index: u32, ty: TypeRef) {
        self.blocks[b].args[index as usize].ty = ty;
        let v = self.block_arg(b, index);
        self.values[v].ty = ty;
    }

    /// The operation owning the region this block belongs to.
    pub fn block_parent_op(&self, b: BlockRef) -> Option<OpRef> {
        let region = self.blocks[b].parent_region?;
        self.regions[region].parent_op
    }

    /// The block's terminator (last operation), if any.
    pub fn block_terminator(&self, b: BlockRef) -> Option<OpRef> {
        self.blocks[b].ops.last().copied()
    }

    /// Append an operation to the end of a block.
    ///
    /// # Panics
    ///
    /// Panics if the operation already belongs to a block.
    pub fn push_op(&mut self, block: BlockRef, op: OpRef) {
        if let Some(existing) = self.ops[op].parent_block {
            panic!(
                "push_op: operation {op} already belongs to block {existing}; \
                 remove it from the old block first",
            );
        }
        self.ops[op].parent_block = Some(block);
        self.blocks[block].ops.push(op);
    }

    /// Insert an operation before `before` in the given block.
    ///
    /// # Panics
    ///
    /// Panics if the operation already belongs to a block, or if `before`
    /// is not in the block.
    pub fn insert_op_before(&mut self, block: BlockRef, before: OpRef, op: OpRef) {
        if let Some(existing) = self.ops[op].parent_block {
            panic!(
                "insert_op_before: operation {op} already belongs to block {existing}; \
                 remove it from the old block first",
            );
        }
        let ops = &mut self.blocks[block].ops;
        let Some(pos) = ops.iter().position(|&o| o == before) else {
            panic!("insert_op_before: {before} not found in {block}");
        };
        ops.insert(pos, op);
        self.ops[op].parent_block = Some(block);
    }

    /// Remove an operation from a block without destroying it.
    pub fn remove_op_from_block(&mut self, block: BlockRef, op: OpRef) {
        self.blocks[block].ops.retain(|o| *o != op);
        if self.ops[op].parent_block == Some(block) {
            self.ops[op].parent_block = None;
        }
    }

    // ========================================================================
    // Region
    // ========================================================================

    /// Create a new region.
    ///
    /// # Panics
    ///
    /// Panics if a block in `data.blocks` already belongs to another region.
    pub fn create_region(&mut self, data: RegionData) -> RegionRef {
        let region = self.regions.push(data);

        let blocks: SmallVec<[BlockRef; 4]> = self.regions[region].blocks.clone();
        for &b in &blocks {
            if let Some(existing) = self.blocks[b].parent_region {
                panic!(
                    "create_region: block {b} already belongs to region {existing}; \
                     cannot reassign to {region}",
                );
            }
            self.blocks[b].parent_region = Some(region);
        }

        region
    }

    pub fn region(&self, r: RegionRef) -> &RegionData {
        &self.regions[r]
    }

    pub fn region_mut(&mut self, r: RegionRef) -> &mut RegionData {
        &mut self.regions[r]
    }

    /// Append an unattached block to a region.
    pub fn push_block(&mut self, region: RegionRef, block: BlockRef) {
        if let Some(existing) = self.blocks[block].parent_region {
            panic!("push_block: block {block} already belongs to region {existing}");
        }
        self.blocks[block].parent_region = Some(region);
        self.regions[region].blocks.push(block);
    }

    /// Detach a region from its owning operation without copying it.
    ///
    /// The region keeps its blocks and operations; only ownership moves.
    pub fn detach_region(&mut self, region: RegionRef) {
        if let Some(owner) = self.regions[region].parent_op.take() {
            self.ops[owner].regions.retain(|r| *r != region);
        }
    }

    /// Give an unowned region to an operation, appended after its existing regions.
    pub fn attach_region(&mut self, op: OpRef, region: RegionRef) {
        if let Some(existing) = self.regions[region].parent_op {
            panic!("attach_region: region {region} already belongs to operation {existing}");
        }
        self.regions[region].parent_op = Some(op);
        self.ops[op].regions.push(region);
    }

    /// Whether `block` is (transitively) nested inside `region`.
    pub fn is_block_in_region(&self, block: BlockRef, region: RegionRef) -> bool {
        let mut current = Some(block);
        while let Some(b) = current {
            let Some(r) = self.blocks[b].parent_region else {
                return false;
            };
            if r == region {
                return true;
            }
            current = self.regions[r]
                .parent_op
                .and_then(|op| self.ops[op].parent_block);
        }
        false
    }

    // ========================================================================
    // Use-chain
    // ========================================================================

    pub fn uses(&self, v: ValueRef) -> &[Use] {
        &self.uses[v]
    }

    pub fn has_uses(&self, v: ValueRef) -> bool {
        !self.uses[v].is_empty()
    }

    /// Replace all uses of `old` with `new`, updating operand slots and use-chains.
    pub fn replace_all_uses(&mut self, old: ValueRef, new: ValueRef) {
        if old == new {
            return;
        }
        let old_uses = std::mem::take(&mut self.uses[old]);

        for u in &old_uses {
            let slice = self.ops[u.user].operands.as_mut_slice(&mut self.value_pool);
            debug_assert_eq!(slice[u.operand_index as usize], old);
            slice[u.operand_index as usize] = new;
            self.uses[new].push(*u);
        }
    }
}

impl Default for IrContext {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// OperationDataBuilder
// ============================================================================

/// Builder for `OperationData` with pool-backed lists.
///
/// Collects operands and result types into `Vec`s, then packs them
/// into `EntityList`s on `build()`.
pub struct OperationDataBuilder {
    location: Location,
    dialect: Symbol,
    name: Symbol,
    operands: Vec<ValueRef>,
    results: Vec<TypeRef>,
    attributes: BTreeMap<Symbol, Attribute>,
    regions: SmallVec<[RegionRef; 4]>,
    successors: SmallVec<[BlockRef; 4]>,
}

impl OperationDataBuilder {
    pub fn new(location: Location, dialect: Symbol, name: Symbol) -> Self {
        Self {
            location,
            dialect,
            name,
            operands: Vec::new(),
            results: Vec::new(),
            attributes: BTreeMap::new(),
            regions: SmallVec::new(),
            successors: SmallVec::new(),
        }
    }

    pub fn operand(mut self, v: ValueRef) -> Self {
        self.operands.push(v);
        self
    }

    pub fn operands(mut self, vs: impl IntoIterator<Item = ValueRef>) -> Self {
        self.operands.extend(vs);
        self
    }

    pub fn result(mut self, ty: TypeRef) -> Self {
        self.results.push(ty);
        self
    }

    pub fn results(mut self, tys: impl IntoIterator<Item = TypeRef>) -> Self {
        self.results.extend(tys);
        self
    }

    pub fn attr(mut self, key: impl Into<Symbol>, val: Attribute) -> Self {
        self.attributes.insert(key.into(), val);
        self
    }

    pub fn attrs(mut self, attrs: impl IntoIterator<Item = (Symbol, Attribute)>) -> Self {
        self.attributes.extend(attrs);
        self
    }

    pub fn region(mut self, r: RegionRef) -> Self {
        self.regions.push(r);
        self
    }

    pub fn successor(mut self, b: BlockRef) -> Self {
        self.successors.push(b);
        self
    }

    pub fn successors(mut self, bs: impl IntoIterator<Item = BlockRef>) -> Self {
        self.successors.extend(bs);
        self
    }

    pub fn build(self, ctx: &mut IrContext) -> OperationData {
        let mut operands = EntityList::new();
        for v in self.operands {
            operands.push(v, &mut ctx.value_pool);
        }
        let mut results = EntityList::new();
        for ty in self.results {
            results.push(ty, &mut ctx.type_pool);
        }
        OperationData {
            location: self.location,
            dialect: self.dialect,
            name: self.name,
            operands,
            results,
            attributes: self.attributes,
            regions: self.regions,
            successors: self.successors,
            parent_block: None,
        }
    }
}
