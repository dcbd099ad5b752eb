// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use log::trace;

use super::{
    Heap,
    heap_bits::{HeapBits, HeapMarkAndSweep, WorkQueues},
    indexes::BaseIndex,
};

fn mark_heap_vector<T: HeapMarkAndSweep>(
    mut marks: Box<[BaseIndex<T>]>,
    bits: &mut [bool],
    values: &[Option<T>],
    queues: &mut WorkQueues,
) {
    marks.sort();
    marks.iter().for_each(|&idx| {
        let index = idx.into_index();
        if let Some(marked) = bits.get_mut(index) {
            if *marked {
                // Already marked, ignore
                return;
            }
            *marked = true;
            values.get(index).mark_values(queues);
        }
    });
}

fn sweep_heap_vector<T>(values: &mut [Option<T>], bits: &[bool]) -> usize {
    let mut swept = 0;
    values
        .iter_mut()
        .zip(bits.iter())
        .for_each(|(value, &marked)| {
            if !marked && value.is_some() {
                *value = None;
                swept += 1;
            }
        });
    swept
}

pub(super) fn heap_gc(heap: &mut Heap, roots: &[&dyn HeapMarkAndSweep]) {
    let mut bits = HeapBits::new(heap);
    let mut queues = WorkQueues::new(heap);

    roots.iter().for_each(|root| root.mark_values(&mut queues));

    while !queues.is_empty() {
        let Heap {
            objects,
            shapes,
            property_keys,
            property_boxes,
            invalidation_cells,
            prototype_handlers,
            transition_handlers,
            property_key_table: _,
        } = &*heap;

        let object_marks: Box<[_]> = queues.objects.drain(..).collect();
        mark_heap_vector(object_marks, &mut bits.objects, objects, &mut queues);
        let shape_marks: Box<[_]> = queues.shapes.drain(..).collect();
        mark_heap_vector(shape_marks, &mut bits.shapes, shapes, &mut queues);
        let property_key_marks: Box<[_]> = queues.property_keys.drain(..).collect();
        mark_heap_vector(
            property_key_marks,
            &mut bits.property_keys,
            property_keys,
            &mut queues,
        );
        let property_box_marks: Box<[_]> = queues.property_boxes.drain(..).collect();
        mark_heap_vector(
            property_box_marks,
            &mut bits.property_boxes,
            property_boxes,
            &mut queues,
        );
        let invalidation_cell_marks: Box<[_]> = queues.invalidation_cells.drain(..).collect();
        mark_heap_vector(
            invalidation_cell_marks,
            &mut bits.invalidation_cells,
            invalidation_cells,
            &mut queues,
        );
        let prototype_handler_marks: Box<[_]> = queues.prototype_handlers.drain(..).collect();
        mark_heap_vector(
            prototype_handler_marks,
            &mut bits.prototype_handlers,
            prototype_handlers,
            &mut queues,
        );
        let transition_handler_marks: Box<[_]> = queues.transition_handlers.drain(..).collect();
        mark_heap_vector(
            transition_handler_marks,
            &mut bits.transition_handlers,
            transition_handlers,
            &mut queues,
        );
    }

    sweep(heap, &bits);
}

fn sweep(heap: &mut Heap, bits: &HeapBits) {
    let Heap {
        objects,
        shapes,
        property_keys,
        property_boxes,
        invalidation_cells,
        prototype_handlers,
        transition_handlers,
        property_key_table,
    } = heap;
    let swept = sweep_heap_vector(objects, &bits.objects)
        + sweep_heap_vector(shapes, &bits.shapes)
        + sweep_heap_vector(property_keys, &bits.property_keys)
        + sweep_heap_vector(property_boxes, &bits.property_boxes)
        + sweep_heap_vector(invalidation_cells, &bits.invalidation_cells)
        + sweep_heap_vector(prototype_handlers, &bits.prototype_handlers)
        + sweep_heap_vector(transition_handlers, &bits.transition_handlers);
    property_key_table.retain(|key| bits.property_keys[key.into_index()]);
    trace!("heap_gc: swept {swept} values");
}
